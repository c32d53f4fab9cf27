//! UI module - terminal output concerns
//!
//! Pipeline code reports through the [`Reporter`] trait; the console
//! implementation renders plain, aligned lines. Nothing outside this
//! module prints directly.

pub mod console;
pub mod reporter;

pub use console::ConsoleReporter;
pub use reporter::{NullReporter, Reporter};
