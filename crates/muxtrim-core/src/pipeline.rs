//! The end-to-end run: acquire, extract, trim, rewrite, repack.
//!
//! Steps run strictly in order against one work directory. Any failure stops
//! the run and leaves the work directory as it was at that point.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Instant;

use reqwest::Client;
use tracing::{debug, info};

use crate::archive::{self, RepackSummary};
use crate::config::TrimConfig;
use crate::error::PipelineError;
use crate::fetch::{self, VersionList};
use crate::nuspec::{self, RewriteOutcome};
use crate::paths;
use crate::reporter::Reporter;
use crate::trim::{ResourceIndexTool, TrimStats, TrimmedIndex, Trimmer};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Version that was processed, without the trim suffix.
    pub version: String,
    /// SHA-256 of the input archive.
    pub archive_sha256: String,
    /// Number of files extracted from the input.
    pub extracted: usize,
    /// Every resource index that went through the trimmer.
    pub trimmed: Vec<TrimmedIndex>,
    /// What the manifest rewrite did.
    pub manifest: RewriteOutcome,
    /// The written package.
    pub output: RepackSummary,
}

impl PipelineReport {
    /// Counters summed over every trimmed index.
    pub fn total_stats(&self) -> TrimStats {
        let mut total = TrimStats::default();
        for index in &self.trimmed {
            total.merge(&index.stats);
        }
        total
    }
}

/// One configured run.
pub struct Pipeline<R: Reporter, T: ResourceIndexTool> {
    config: TrimConfig,
    reporter: R,
    tool: T,
    client: Client,
}

impl<R: Reporter, T: ResourceIndexTool> fmt::Debug for Pipeline<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: Reporter, T: ResourceIndexTool> Pipeline<R, T> {
    /// Pipeline over `config`, reporting to `reporter` and rebuilding
    /// indexes with `tool`.
    pub fn new(config: TrimConfig, reporter: R, tool: T) -> Self {
        Self {
            config,
            reporter,
            tool,
            client: Client::new(),
        }
    }

    /// Configuration this pipeline runs with.
    pub fn config(&self) -> &TrimConfig {
        &self.config
    }

    /// Published versions, or the configured fallback.
    pub async fn versions(&self) -> VersionList {
        fetch::fetch_versions(
            &self.client,
            &self.config.index_url(),
            &self.config.fallback_version,
        )
        .await
    }

    /// Produce the trimmed package for `version`.
    pub async fn run(&self, version: &str) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let config = &self.config;
        let work_dir = paths::absolute(&config.work_dir)?;
        let source = config
            .source
            .as_deref()
            .map(paths::absolute)
            .transpose()?;

        if let Some(source) = &source {
            if source.starts_with(&work_dir) {
                return Err(PipelineError::context(
                    "Work directory",
                    format!("{} would delete the source archive", work_dir.display()),
                ));
            }
        }
        reset_work_dir(&work_dir)?;

        self.reporter.section("Fetching");
        let input = config.input_archive_path(&work_dir);
        let archive_sha256 = match &source {
            Some(source) => {
                fs::copy(source, &input)?;
                self.reporter
                    .info(&format!("Using local package {}", source.display()));
                archive::sha256_file(&input)?
            }
            None => {
                let url = config.download_url(version);
                let label = format!("{} {version}", config.package_id);
                fetch::download(&self.client, &url, &input, &label, &self.reporter).await?
            }
        };
        info!(version, sha256 = %archive_sha256, "package acquired");

        self.reporter.section("Extracting");
        let extracted = archive::extract_package(&input, &work_dir, config.clock, &self.reporter)?;
        self.reporter
            .success(&format!("Extracted {} files", extracted.len()));

        self.reporter.section("Trimming");
        let denylist = config.denylist();
        debug!(fragments = ?denylist.fragments(), "denylist");
        let trimmer = Trimmer::new(&self.tool, &denylist, &config.package_id);
        let trimmed = trimmer.trim_tree(&work_dir, &self.reporter)?;
        for index in &trimmed {
            let rel = index.path.strip_prefix(&work_dir).unwrap_or(&index.path);
            self.reporter.success(&format!(
                "{}: blanked {}, already blank {}",
                rel.display(),
                index.stats.blanked,
                index.stats.already_blank
            ));
        }

        let manifest_path = work_dir.join(config.manifest_name());
        let manifest = nuspec::rewrite_manifest(&manifest_path, version)?;
        if manifest == RewriteOutcome::AlreadyApplied {
            self.reporter.warning(&format!(
                "{} already carries version {}",
                config.manifest_name(),
                nuspec::trimmed_version(version)
            ));
        }

        self.reporter.section("Packaging");
        let output_path = work_dir.join(config.output_file_name(version));
        let output = archive::repack(&work_dir, &output_path, config.clock)?;
        debug!(entries = output.entries, sha256 = %output.sha256, "output written");

        self.reporter
            .summary(&output.output, started.elapsed().as_secs_f64());

        Ok(PipelineReport {
            version: version.to_string(),
            archive_sha256,
            extracted: extracted.len(),
            trimmed,
            manifest,
            output,
        })
    }
}

/// Remove and recreate the work directory.
fn reset_work_dir(work_dir: &Path) -> Result<(), PipelineError> {
    if work_dir.parent().is_none() {
        return Err(PipelineError::context(
            "Work directory",
            format!("refusing to wipe {}", work_dir.display()),
        ));
    }
    if work_dir.exists() {
        debug!(path = %work_dir.display(), "clearing work directory");
        fs::remove_dir_all(work_dir)?;
    }
    fs::create_dir_all(work_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::tools::ToolError;

    struct NoTool;

    impl ResourceIndexTool for NoTool {
        fn dump(&self, _: &Path) -> Result<(), ToolError> {
            unreachable!("no index in these tests")
        }
        fn rebuild(&self, _: &Path, _: &str) -> Result<(), ToolError> {
            unreachable!("no index in these tests")
        }
    }

    #[test]
    fn test_debug_shows_config() {
        let pipeline = Pipeline::new(TrimConfig::default(), NullReporter, NoTool);
        let shown = format!("{pipeline:?}");
        assert!(shown.starts_with("Pipeline {"));
        assert!(shown.contains("Microsoft.UI.Xaml"));
        assert!(shown.ends_with(".. }"));
    }

    #[test]
    fn test_reset_work_dir_clears_contents() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("out");
        fs::create_dir_all(work.join("stale")).unwrap();
        fs::write(work.join("stale").join("x"), b"x").unwrap();

        reset_work_dir(&work).unwrap();
        assert!(work.is_dir());
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
    }

    #[test]
    fn test_reset_refuses_filesystem_root() {
        let root = paths::absolute(Path::new("/")).unwrap();
        let err = reset_work_dir(&root).unwrap_err();
        assert!(matches!(err, PipelineError::Context { .. }));
    }

    #[tokio::test]
    async fn test_source_inside_work_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("out");
        fs::create_dir_all(&work).unwrap();
        let source = work.join("pkg.nupkg");
        fs::write(&source, b"zip").unwrap();

        let config = TrimConfig {
            work_dir: work,
            source: Some(source.clone()),
            ..TrimConfig::default()
        };
        let err = Pipeline::new(config, NullReporter, NoTool)
            .run("1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Context { .. }));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_run() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("pkg.nupkg");
        {
            let mut zip = zip::ZipWriter::new(fs::File::create(&source).unwrap());
            zip.start_file("readme.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"hello").unwrap();
            zip.finish().unwrap();
        }

        let config = TrimConfig {
            work_dir: dir.path().join("out"),
            source: Some(source),
            ..TrimConfig::default()
        };
        let err = Pipeline::new(config, NullReporter, NoTool)
            .run("1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Manifest(_)));
    }
}
