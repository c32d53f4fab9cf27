//! Installation flow typestate
//!
//! Models the per-formula pipeline as explicit state transitions:
//! `UnresolvedFormula` -> `ResolvedFormula` -> `FetchedFormula`
//!
//! This enforces at compile time that a formula cannot be fetched before it
//! is resolved, and cannot be built before its source is fetched and
//! verified.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::formula::{Formula, Source};
use crate::core::resolver::{DirLoader, FormulaLoader};
use crate::io::extract;
use crate::io::fetch::{FetchedSource, Fetcher};
use crate::ops::InstallError;
use crate::types::FormulaName;
use crate::ui::Reporter;

/// A requested formula: a name (optionally pinned, `name@version`) or a
/// path to a formula file.
#[derive(Debug, Clone)]
pub struct FormulaSpec {
    pub target: String,
    pub pin: Option<String>,
}

impl FormulaSpec {
    /// Parse CLI input. A path to an existing file is taken verbatim;
    /// otherwise `name@version` splits into name and pin.
    pub fn parse(input: &str) -> Self {
        if Path::new(input).exists() {
            return Self {
                target: input.to_string(),
                pin: None,
            };
        }
        match input.rsplit_once('@') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => Self {
                target: name.to_string(),
                pin: Some(version.to_string()),
            },
            _ => Self {
                target: input.to_string(),
                pin: None,
            },
        }
    }
}

/// Step 1: requested but not yet matched against a formula definition.
pub struct UnresolvedFormula {
    pub spec: FormulaSpec,
}

/// Step 2: definition loaded and validated, pin checked against the
/// declared version history.
#[derive(Debug)]
pub struct ResolvedFormula {
    pub formula: Formula,
    pub pin: Option<String>,
}

/// Step 3: source archive fetched, verified, and unpacked into a
/// temporary working tree.
pub struct FetchedFormula {
    pub resolved: ResolvedFormula,
    pub source: FetchedSource,
    pub source_tree: PathBuf,
    /// Owns the working tree; dropping it discards partial staging.
    pub temp_dir: TempDir,
}

impl UnresolvedFormula {
    pub fn new(spec: FormulaSpec) -> Self {
        Self { spec }
    }

    /// Resolve against a formula file path or the formula directory.
    pub fn resolve(self, loader: &DirLoader) -> Result<ResolvedFormula, InstallError> {
        let path = Path::new(&self.spec.target);
        let formula = if path.exists() {
            Formula::from_file(path)?
        } else {
            let name = FormulaName::new(&self.spec.target);
            loader.load(&name)?.ok_or_else(|| {
                InstallError::Validation(format!("no formula definition for '{name}'"))
            })?
        };

        if let Some(pin) = &self.spec.pin {
            if formula.select_sources(Some(pin)).is_empty() {
                return Err(InstallError::Validation(format!(
                    "formula '{}' declares no version '{pin}'",
                    formula.name()
                )));
            }
        }

        Ok(ResolvedFormula {
            formula,
            pin: self.spec.pin,
        })
    }
}

impl ResolvedFormula {
    pub fn name(&self) -> FormulaName {
        self.formula.name()
    }

    /// The ordered fetch list after applying the pin.
    pub fn sources(&self) -> Vec<&Source> {
        self.formula.select_sources(self.pin.as_deref())
    }

    /// Fetch, verify, and unpack the source archive.
    pub async fn fetch<R: Reporter>(
        self,
        fetcher: &Fetcher<'_>,
        tmp_dir: &Path,
        reporter: &R,
    ) -> Result<FetchedFormula, InstallError> {
        let name = self.name();
        let source = fetcher.fetch(&name, &self.sources(), reporter).await?;

        std::fs::create_dir_all(tmp_dir)?;
        let temp_dir = tempfile::Builder::new()
            .prefix("alembic-")
            .tempdir_in(tmp_dir)?;

        let source_tree = temp_dir.path().join("src");
        std::fs::create_dir_all(&source_tree)?;

        let archive = source.archive.clone();
        let declared_name = source.url.clone();
        let tree = source_tree.clone();
        tokio::task::spawn_blocking(move || {
            extract::extract_auto(&archive, &declared_name, &tree)?;
            extract::strip_components(&tree)?;
            Ok::<_, InstallError>(())
        })
        .await
        .map_err(|e| InstallError::Incomplete(format!("extract task panicked: {e}")))??;

        Ok(FetchedFormula {
            resolved: self,
            source,
            source_tree,
            temp_dir,
        })
    }
}
