//! Reporter trait for dependency injection
//!
//! This trait allows pipeline logic to report progress and status without
//! being coupled to a specific output implementation.

use crate::core::smoke::SmokeStatus;
use crate::types::FormulaName;

pub trait Reporter: Send + Sync {
    /// A fetch attempt has started for a source url.
    fn fetching(&self, name: &FormulaName, url: &str);

    /// A fetch attempt failed recoverably; the next source will be tried.
    fn fetch_retry(&self, name: &FormulaName, url: &str, reason: &str);

    /// A build step is running.
    fn building(&self, name: &FormulaName, step: &str);

    /// The staged tree is being installed into its prefix.
    fn installing(&self, name: &FormulaName, version: &str);

    /// An operation completed successfully.
    fn done(&self, name: &FormulaName, version: &str, detail: &str);

    /// An operation failed with a specific reason.
    fn failed(&self, name: &FormulaName, reason: &str);

    /// Post-install caveat text.
    fn caveats(&self, name: &FormulaName, text: &str);

    /// Smoke-test outcome.
    fn smoke(&self, name: &FormulaName, status: &SmokeStatus);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

/// Discards everything. Used by tests and `--quiet`.
#[derive(Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn fetching(&self, _name: &FormulaName, _url: &str) {}
    fn fetch_retry(&self, _name: &FormulaName, _url: &str, _reason: &str) {}
    fn building(&self, _name: &FormulaName, _step: &str) {}
    fn installing(&self, _name: &FormulaName, _version: &str) {}
    fn done(&self, _name: &FormulaName, _version: &str, _detail: &str) {}
    fn failed(&self, _name: &FormulaName, _reason: &str) {}
    fn caveats(&self, _name: &FormulaName, _text: &str) {}
    fn smoke(&self, _name: &FormulaName, _status: &SmokeStatus) {}
    fn info(&self, _msg: &str) {}
    fn warning(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn summary(&self, _count: usize, _action: &str, _elapsed_secs: f64) {}
}
