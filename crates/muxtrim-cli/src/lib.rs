//! muxtrim - trimmed Microsoft.UI.Xaml packages
//!
//! Command-line front end for [`muxtrim_core`]. Parses flags, layers them
//! over the configuration file and hands the result to the pipeline.
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod ui;

use std::path::PathBuf;

use clap::Parser;
use muxtrim_core::{ArchiveClock, TrimConfig};

#[derive(Debug, Parser)]
#[command(name = "muxtrim")]
#[command(
    author,
    version = env!("MUXTRIM_BUILD_VERSION"),
    long_version = concat!(
        env!("MUXTRIM_BUILD_VERSION"),
        " (",
        env!("MUXTRIM_BUILD_COMMIT"),
        ")"
    ),
    about = "Build a trimmed Microsoft.UI.Xaml NuGet package"
)]
pub struct Cli {
    /// Package version to process; skips the prompt
    #[arg(long, env = "MUXTRIM_PACKAGE_VERSION")]
    pub version_tag: Option<String>,

    /// Accept the default version without prompting
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Work and output directory, wiped on every run [default: out]
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(long, env = "MUXTRIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use a local .nupkg instead of downloading
    #[arg(long, value_name = "NUPKG")]
    pub source: Option<PathBuf>,

    /// Path to makepri.exe; skips Windows SDK discovery
    #[arg(long)]
    pub makepri: Option<PathBuf>,

    /// Also require an MSBuild install
    #[arg(long)]
    pub verify_msbuild: bool,

    /// Read and write archive timestamps as UTC instead of local time
    #[arg(long)]
    pub utc: bool,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlay explicitly given flags on `config`.
    pub fn apply(&self, config: &mut TrimConfig) {
        if let Some(version) = &self.version_tag {
            config.version = Some(version.clone());
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir.clone_from(dir);
        }
        if let Some(source) = &self.source {
            config.source = Some(source.clone());
        }
        if let Some(makepri) = &self.makepri {
            config.tools.makepri = Some(makepri.clone());
        }
        if self.verify_msbuild {
            config.tools.verify_msbuild = true;
        }
        if self.utc {
            config.clock = ArchiveClock::Utc;
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose { "debug" } else { "warn" }
    }
}
