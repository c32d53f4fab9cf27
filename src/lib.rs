//! alembic - a formula-driven source installer
//!
//! # Overview
//!
//! Alembic installs command-line tools from declarative TOML formulas:
//! fetch a source archive from its declared locations, verify it against a
//! SHA-256 checksum, run the formula's build recipe through a pluggable
//! build-tool adapter, stage the result into an isolated prefix, and run
//! the declared smoke test against the installed artifact.
//!
//! # Architecture
//!
//! - **Typestate Pattern**: The pipeline uses `UnresolvedFormula` ->
//!   `ResolvedFormula` -> `FetchedFormula` to enforce correct ordering at
//!   compile time.
//! - **Actor Pattern**: Registry access is serialized through
//!   `RegistryHandle` so concurrent installs never race record swaps.
//! - **Newtypes**: `FormulaName` and `Sha256Digest` provide type-safe
//!   identifiers.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.alembic/
//! ├── formulas/      # Formula definitions (<name>.toml)
//! ├── prefix/        # Installed trees by name/version
//! ├── cache/         # Downloaded archives (by digest)
//! ├── tmp/           # Staging (same volume as prefix)
//! ├── logs/          # Build logs
//! └── records.json   # Installation registry
//! ```

pub mod core;
pub mod io;
pub mod ops;
pub mod store;
pub mod types;
pub mod ui;

// Re-exports for convenience
pub use crate::core::formula;
pub use crate::core::resolver;
pub use crate::io::fetch as fetcher;
pub use crate::store::RegistryHandle;

use dirs::home_dir;
use std::path::PathBuf;

/// Returns the primary configuration directory, or None if the user's home
/// cannot be resolved.
pub fn try_alembic_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("ALEMBIC_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".alembic"))
}

/// Returns the canonical alembic home directory (`~/.alembic`).
///
/// # Panics
/// Panics if the home directory cannot be determined.
pub fn alembic_home() -> PathBuf {
    try_alembic_home().expect("Could not determine home directory")
}

/// Default formula directory: ~/.alembic/formulas
pub fn default_formula_dir() -> PathBuf {
    alembic_home().join("formulas")
}

/// Extract the filename from a URL.
///
/// # Example
///
/// ```
/// use alembic::filename_from_url;
///
/// assert_eq!(filename_from_url("https://example.com/path/to/file.tar.gz"), "file.tar.gz");
/// assert_eq!(filename_from_url(""), "");
/// ```
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}

/// User Agent string
pub const USER_AGENT: &str = concat!("alembic/", env!("CARGO_PKG_VERSION"));
