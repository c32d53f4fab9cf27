//! Plain console reporter
//!
//! Fixed-prefix lines, one event per line. Status lines go to stdout,
//! warnings and errors to stderr.

use crate::core::smoke::SmokeStatus;
use crate::types::FormulaName;

use super::reporter::Reporter;

// Fixed column width for name alignment
const NAME_WIDTH: usize = 12;

#[derive(Clone, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn line(&self, marker: &str, name: &FormulaName, detail: &str) {
        if !self.quiet {
            println!("  {marker} {:<width$}  {detail}", name.as_str(), width = NAME_WIDTH);
        }
    }

    fn err_line(&self, marker: &str, name: &FormulaName, detail: &str) {
        eprintln!("  {marker} {:<width$}  {detail}", name.as_str(), width = NAME_WIDTH);
    }
}

impl Reporter for ConsoleReporter {
    fn fetching(&self, name: &FormulaName, url: &str) {
        self.line("↓", name, url);
    }

    fn fetch_retry(&self, name: &FormulaName, url: &str, reason: &str) {
        if !self.quiet {
            self.err_line("!", name, &format!("{url} ({reason}), trying next source"));
        }
    }

    fn building(&self, name: &FormulaName, step: &str) {
        self.line("⚙", name, step);
    }

    fn installing(&self, name: &FormulaName, version: &str) {
        self.line("→", name, version);
    }

    fn done(&self, name: &FormulaName, version: &str, detail: &str) {
        self.line("✔", name, &format!("{version}  {detail}"));
    }

    fn failed(&self, name: &FormulaName, reason: &str) {
        self.err_line("✗", name, reason);
    }

    fn caveats(&self, name: &FormulaName, text: &str) {
        if self.quiet || text.is_empty() {
            return;
        }
        println!("==> Caveats: {name}");
        for line in text.lines() {
            println!("  {line}");
        }
    }

    fn smoke(&self, name: &FormulaName, status: &SmokeStatus) {
        match status {
            SmokeStatus::Passed => self.line("✔", name, "test passed"),
            SmokeStatus::Failed {
                expected_exit,
                actual_exit,
                expected_output,
                actual_output,
            } => {
                self.err_line("✗", name, "test failed");
                eprintln!("      expected exit {expected_exit}, got {actual_exit}");
                eprintln!("      expected output containing: {expected_output:?}");
                eprintln!("      actual output: {actual_output:?}");
            }
            SmokeStatus::Errored { reason } => {
                self.err_line("✗", name, &format!("test errored: {reason}"));
            }
            SmokeStatus::NotRun | SmokeStatus::Running => {}
        }
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{msg}");
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!("warning: {msg}");
    }

    fn error(&self, msg: &str) {
        eprintln!("error: {msg}");
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        if !self.quiet {
            println!("{count} {action} in {elapsed_secs:.1}s");
        }
    }
}
