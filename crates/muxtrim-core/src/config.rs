//! Run configuration.
//!
//! A [`TrimConfig`] fully describes one pipeline run. It is layered as
//! built-in defaults, then an optional TOML file, then whatever the caller
//! (normally the CLI) overrides field by field.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::paths;
use crate::timestamps::ArchiveClock;
use crate::tools::ToolConfig;
use crate::trim::{Denylist, LEGACY_VARIANTS};

/// Package this tool was built for.
pub const DEFAULT_PACKAGE_ID: &str = "Microsoft.UI.Xaml";

/// Offered when the package index cannot be reached.
pub const DEFAULT_FALLBACK_VERSION: &str = "2.8.7-prerelease.241119001";

/// Downloaded archive name inside the work dir.
pub const INPUT_ARCHIVE: &str = "input.nupkg";

/// Failures loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for [`TrimConfig`].
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// NuGet endpoint templates. `{id}`, `{id_lower}` and `{version}` are
/// substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Endpoints {
    /// Flat-container version index.
    pub index: String,
    /// Package download.
    pub download: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            index: "https://api.nuget.org/v3-flatcontainer/{id_lower}/index.json".to_string(),
            download: "https://www.nuget.org/api/v2/package/{id}/{version}".to_string(),
        }
    }
}

/// Everything one run needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrimConfig {
    /// NuGet package id.
    pub package_id: String,
    /// Version to process. `None` means ask.
    pub version: Option<String>,
    /// Scratch and output directory. Wiped at the start of each run.
    pub work_dir: PathBuf,
    /// Local archive to use instead of downloading.
    pub source: Option<PathBuf>,
    /// Single version offered when the index query fails.
    pub fallback_version: String,
    /// Resource name fragments to blank.
    pub denylist: Vec<String>,
    /// Zone for archive timestamps.
    pub clock: ArchiveClock,
    /// NuGet URLs.
    pub endpoints: Endpoints,
    /// Build tool discovery.
    pub tools: ToolConfig,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            package_id: DEFAULT_PACKAGE_ID.to_string(),
            version: None,
            work_dir: PathBuf::from("out"),
            source: None,
            fallback_version: DEFAULT_FALLBACK_VERSION.to_string(),
            denylist: LEGACY_VARIANTS.iter().map(ToString::to_string).collect(),
            clock: ArchiveClock::default(),
            endpoints: Endpoints::default(),
            tools: ToolConfig::default(),
        }
    }
}

impl TrimConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), else the per-user config
    /// file if present, else the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match paths::default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// The configured fragments as a matcher.
    pub fn denylist(&self) -> Denylist {
        Denylist::new(self.denylist.iter().cloned())
    }

    /// Version index URL for the configured package.
    pub fn index_url(&self) -> String {
        self.expand(&self.endpoints.index, "")
    }

    /// Download URL for `version` of the configured package.
    pub fn download_url(&self, version: &str) -> String {
        self.expand(&self.endpoints.download, version)
    }

    fn expand(&self, template: &str, version: &str) -> String {
        template
            .replace("{id_lower}", &self.package_id.to_lowercase())
            .replace("{id}", &self.package_id)
            .replace("{version}", version)
    }

    /// `<id>.pri`
    pub fn resource_index_name(&self) -> String {
        format!("{}.pri", self.package_id)
    }

    /// `<id>.nuspec`
    pub fn manifest_name(&self) -> String {
        format!("{}.nuspec", self.package_id)
    }

    /// `<id>.<version>.trim.nupkg`
    pub fn output_file_name(&self, version: &str) -> String {
        format!("{}.{}.trim.nupkg", self.package_id, version)
    }

    /// Where the input archive is placed inside `work_dir`.
    pub fn input_archive_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(INPUT_ARCHIVE)
    }
}
