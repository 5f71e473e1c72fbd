//! muxtrim core
//!
//! Builds a size-reduced redistribution of the `Microsoft.UI.Xaml` NuGet
//! package: fetch the `.nupkg`, blank legacy-variant markup resources in the
//! embedded resource indexes, bump the manifest version and repackage.
//!
//! # Pipeline
//!
//! ```text
//! tools ──► fetch ──► archive::extract ──► trim ──► nuspec ──► archive::repack
//! ```
//!
//! Every step takes explicit absolute paths; nothing here changes the process
//! working directory. The resource index tool (`makepri.exe`) sits behind the
//! [`trim::ResourceIndexTool`] trait so the trimming logic can run against
//! recorded fixtures.

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod nuspec;
pub mod paths;
pub mod pipeline;
pub mod reporter;
pub mod timestamps;
pub mod tools;
pub mod trim;

pub use config::TrimConfig;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineReport};
pub use reporter::{NullReporter, Reporter};
pub use timestamps::ArchiveClock;

/// User Agent string for network operations
pub const USER_AGENT: &str = concat!("muxtrim/", env!("CARGO_PKG_VERSION"));
