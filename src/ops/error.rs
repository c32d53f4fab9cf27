//! Domain-specific errors for install operations

use thiserror::Error;

use crate::core::builder::BuildError;
use crate::core::formula::FormulaError;
use crate::core::resolver::ResolveError;
use crate::io::extract::ExtractError;
use crate::io::fetch::FetchError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("{0}")]
    Formula(#[from] FormulaError),

    #[error("{0}")]
    Resolve(#[from] ResolveError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Extract(#[from] ExtractError),

    #[error("registry error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("installation incomplete: {0}")]
    Incomplete(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cancelled")]
    Cancelled,
}

impl InstallError {
    /// Stable error-kind label for the one-line diagnostic.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Formula(FormulaError::Malformed { .. }) => "MalformedFormula",
            Self::Formula(_) => "FormulaUnreadable",
            Self::Resolve(ResolveError::Cycle { .. }) => "DependencyCycle",
            Self::Resolve(ResolveError::Unresolved { .. }) => "UnresolvedDependency",
            Self::Resolve(ResolveError::Formula(_)) => "MalformedFormula",
            Self::Fetch(FetchError::Exhausted { .. }) => "FetchExhausted",
            Self::Fetch(FetchError::ChecksumMismatch { .. }) => "ChecksumMismatch",
            Self::Fetch(_) => "FetchFailed",
            Self::Build(BuildError::Cancelled) => "Cancelled",
            Self::Build(_) => "BuildFailed",
            Self::Extract(_) => "ExtractFailed",
            Self::Store(_) => "RegistryError",
            Self::Io(_) => "IoError",
            Self::Incomplete(_) => "InstallationIncomplete",
            Self::Validation(_) => "Validation",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Pipeline step the error belongs to, for diagnostics.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Formula(_) => "parse",
            Self::Resolve(_) => "resolve",
            Self::Fetch(_) => "fetch",
            Self::Extract(_) => "extract",
            Self::Build(_) => "build",
            Self::Store(_) | Self::Io(_) | Self::Incomplete(_) => "install",
            Self::Validation(_) => "validate",
            Self::Cancelled => "cancel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FormulaName;

    #[test]
    fn kinds_match_taxonomy() {
        let err = InstallError::Resolve(ResolveError::Cycle {
            name: FormulaName::new("a"),
        });
        assert_eq!(err.kind(), "DependencyCycle");
        assert_eq!(err.step(), "resolve");

        let err = InstallError::Fetch(FetchError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        });
        assert_eq!(err.kind(), "ChecksumMismatch");
        assert_eq!(err.step(), "fetch");

        let err = InstallError::Formula(FormulaError::Malformed {
            reason: "x".into(),
        });
        assert_eq!(err.kind(), "MalformedFormula");
    }
}
