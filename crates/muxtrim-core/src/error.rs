//! Top-level error for a pipeline run.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::nuspec::ManifestError;
use crate::tools::ToolError;
use crate::trim::TrimError;

/// Any failure that stops a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tool discovery or execution failed.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The package could not be downloaded.
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    /// Extraction or repacking failed.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A resource index could not be trimmed.
    #[error("Trim failed: {0}")]
    Trim(#[from] TrimError),

    /// The manifest could not be rewritten.
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Work directory handling failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A precondition of the run did not hold.
    #[error("{context}: {message}")]
    Context {
        /// What was being checked.
        context: &'static str,
        /// What went wrong.
        message: String,
    },
}

impl PipelineError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let err = PipelineError::context("Work directory", "contains the source archive");
        assert_eq!(err.to_string(), "Work directory: contains the source archive");
    }

    #[test]
    fn test_wraps_module_errors() {
        let err: PipelineError = ArchiveError::DuplicateEntry("a.txt".into()).into();
        assert!(matches!(err, PipelineError::Archive(_)));
        assert!(err.to_string().contains("a.txt"));
    }
}
