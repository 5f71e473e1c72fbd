//! Reporter trait for dependency injection
//!
//! Lets the pipeline report progress and status without being coupled to a
//! specific terminal implementation.

use std::path::Path;

/// User-facing progress sink for the trim pipeline.
pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Fetching", "Trimming").
    fn section(&self, title: &str);

    /// Updates the progress of a download. `total` is `None` when the server
    /// did not announce a content length.
    fn downloading(&self, name: &str, current: u64, total: Option<u64>);

    /// Updates the progress of an extraction.
    fn extracting(&self, current: u64, total: u64);

    /// A resource index is about to be trimmed.
    fn trimming(&self, path: &Path);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a success message.
    fn success(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display the final summary for a finished run.
    fn summary(&self, output: &Path, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn downloading(&self, name: &str, current: u64, total: Option<u64>) {
        (**self).downloading(name, current, total);
    }
    fn extracting(&self, current: u64, total: u64) {
        (**self).extracting(current, total);
    }
    fn trimming(&self, path: &Path) {
        (**self).trimming(path);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn success(&self, msg: &str) {
        (**self).success(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, output: &Path, elapsed_secs: f64) {
        (**self).summary(output, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &str, _: u64, _: Option<u64>) {}
    fn extracting(&self, _: u64, _: u64) {}
    fn trimming(&self, _: &Path) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: &Path, _: f64) {}
}
