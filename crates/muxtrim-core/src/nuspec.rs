//! `.nuspec` version rewriting.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::timestamps;

/// Appended to the package version of a trimmed build.
pub const TRIM_SUFFIX: &str = ".trim";

/// Failures rewriting a `.nuspec`.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Reading or writing the manifest failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Neither the plain nor the trimmed version tag was found.
    #[error("{}: no <version>{version}</version> tag", path.display())]
    VersionTagMissing {
        /// Manifest that was searched.
        path: PathBuf,
        /// Version that was expected.
        version: String,
    },
}

/// What a rewrite did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The version tag was replaced.
    Rewritten,
    /// The manifest already carried the trimmed version.
    AlreadyApplied,
}

/// `2.8.6` -> `2.8.6.trim`
pub fn trimmed_version(version: &str) -> String {
    format!("{version}{TRIM_SUFFIX}")
}

fn version_tag(version: &str) -> String {
    format!("<version>{version}</version>")
}

/// Rewrite the version tag in manifest text. `None` means neither the
/// original nor the trimmed tag is present.
pub fn rewrite_version(content: &str, version: &str) -> Option<(String, RewriteOutcome)> {
    let original = version_tag(version);
    if content.contains(&original) {
        let replaced = content.replace(&original, &version_tag(&trimmed_version(version)));
        return Some((replaced, RewriteOutcome::Rewritten));
    }
    if content.contains(&version_tag(&trimmed_version(version))) {
        return Some((content.to_string(), RewriteOutcome::AlreadyApplied));
    }
    None
}

/// Rewrite the manifest at `path` in place, keeping its modification time.
pub fn rewrite_manifest(path: &Path, version: &str) -> Result<RewriteOutcome, ManifestError> {
    let mtime = timestamps::modified(path)?;
    let content = fs::read_to_string(path)?;

    let Some((rewritten, outcome)) = rewrite_version(&content, version) else {
        return Err(ManifestError::VersionTagMissing {
            path: path.to_path_buf(),
            version: version.to_string(),
        });
    };

    match outcome {
        RewriteOutcome::Rewritten => {
            fs::write(path, rewritten)?;
            timestamps::set_modified(path, mtime)?;
            debug!(path = %path.display(), "manifest version rewritten");
        }
        RewriteOutcome::AlreadyApplied => {
            warn!(path = %path.display(), "manifest already carries the trimmed version");
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArchiveClock;

    const NUSPEC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>Microsoft.UI.Xaml</id>
    <version>2.8.6</version>
  </metadata>
</package>"#;

    #[test]
    fn test_rewrite_appends_suffix() {
        let (out, outcome) = rewrite_version(NUSPEC, "2.8.6").unwrap();
        assert_eq!(outcome, RewriteOutcome::Rewritten);
        assert!(out.contains("<version>2.8.6.trim</version>"));
        assert!(!out.contains("<version>2.8.6</version>"));
    }

    #[test]
    fn test_rewrite_twice_reports_already_applied() {
        let (once, _) = rewrite_version(NUSPEC, "2.8.6").unwrap();
        let (twice, outcome) = rewrite_version(&once, "2.8.6").unwrap();
        assert_eq!(outcome, RewriteOutcome::AlreadyApplied);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_wrong_version_is_missing() {
        assert!(rewrite_version(NUSPEC, "2.8.5").is_none());
    }

    #[test]
    fn test_rewrite_manifest_keeps_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Microsoft.UI.Xaml.nuspec");
        fs::write(&path, NUSPEC).unwrap();
        let mtime = ArchiveClock::Utc.to_system_time(
            chrono::NaiveDate::from_ymd_opt(2023, 3, 4)
                .unwrap()
                .and_hms_opt(5, 6, 8)
                .unwrap(),
        );
        timestamps::set_modified(&path, mtime).unwrap();

        let outcome = rewrite_manifest(&path, "2.8.6").unwrap();
        assert_eq!(outcome, RewriteOutcome::Rewritten);
        assert!(fs::read_to_string(&path).unwrap().contains("2.8.6.trim"));
        assert_eq!(timestamps::modified(&path).unwrap(), mtime);

        assert_eq!(
            rewrite_manifest(&path, "2.8.6").unwrap(),
            RewriteOutcome::AlreadyApplied
        );
    }

    #[test]
    fn test_missing_tag_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Microsoft.UI.Xaml.nuspec");
        fs::write(&path, NUSPEC).unwrap();

        let err = rewrite_manifest(&path, "9.9.9").unwrap_err();
        assert!(matches!(err, ManifestError::VersionTagMissing { .. }));
    }
}
