//! Terminal presentation.

pub mod output;
pub mod progress;
pub mod prompt;

pub use output::ConsoleOutput;
pub use prompt::prompt_version;
