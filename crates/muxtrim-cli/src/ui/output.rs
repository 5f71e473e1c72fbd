//! Console reporter.
//!
//! Progress updates rewrite a single status line in place; any other message
//! first terminates that line.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use muxtrim_core::Reporter;

use super::progress::format_progress;

/// Terminal implementation of [`Reporter`].
#[derive(Debug, Default)]
pub struct ConsoleOutput {
    /// Whether the cursor sits on an unfinished progress line.
    live_line: Mutex<bool>,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, text: &str) {
        let mut live = self.live_line.lock().unwrap_or_else(|e| e.into_inner());
        // A closed stdout only loses the status line.
        let _ = redraw(text);
        *live = true;
    }

    fn line(&self, text: &str) {
        let mut live = self.live_line.lock().unwrap_or_else(|e| e.into_inner());
        if *live {
            println!();
            *live = false;
        }
        println!("{text}");
    }
}

fn redraw(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.queue(MoveToColumn(0))?;
    write!(stdout, "  {text}")?;
    stdout.queue(Clear(ClearType::UntilNewLine))?;
    stdout.flush()
}

impl Reporter for ConsoleOutput {
    fn section(&self, title: &str) {
        self.line("");
        self.line(&format!("{}", title.bold()));
    }

    fn downloading(&self, name: &str, current: u64, total: Option<u64>) {
        self.live(&format!(
            "{} {name} {}",
            "↓".cyan(),
            format_progress(current, total).dark_grey()
        ));
    }

    fn extracting(&self, current: u64, total: u64) {
        self.live(&format!(
            "{} {current}/{total} files",
            "⇣".cyan()
        ));
    }

    fn trimming(&self, path: &Path) {
        self.line(&format!("  {} {}", "→".cyan(), path.display()));
    }

    fn info(&self, msg: &str) {
        self.line(&format!("  {} {msg}", "i".blue()));
    }

    fn success(&self, msg: &str) {
        self.line(&format!("  {} {msg}", "✓".green()));
    }

    fn warning(&self, msg: &str) {
        self.line(&format!("  {} {msg}", "!".yellow().bold()));
    }

    fn error(&self, msg: &str) {
        self.line(&format!("  {} {msg}", "✗".red().bold()));
    }

    fn summary(&self, output: &Path, elapsed_secs: f64) {
        self.line("");
        self.line(&format!(
            "{} {} {}",
            "Done".green().bold(),
            output.display(),
            format!("({elapsed_secs:.1}s)").dark_grey()
        ));
    }
}
