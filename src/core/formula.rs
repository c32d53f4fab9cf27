//! TOML formula parsing
//!
//! Human-readable definitions of one installable unit: where its source
//! lives, how to verify it, what it needs, how to build it, and how to
//! prove the installed artifact works.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FormulaName, Sha256Digest};

#[derive(Error, Debug)]
pub enum FormulaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Malformed formula: {reason}")]
    Malformed { reason: String },
}

impl FormulaError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Formula identity and legal metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormulaInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    /// Free-form license classifier. The engine never interprets the value;
    /// non-standard sentinels (e.g. `:cannot_represent`) pass through and
    /// are surfaced verbatim.
    #[serde(default)]
    pub license: String,
}

/// One distributable revision or mirror of the formula's source archive.
///
/// The ordered `[[source]]` list is the formula's version history, newest
/// first. Entries are attempted in declared order when fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Optional version label, used for pinning (`name@version`).
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub url: String,
    pub sha256: Sha256Digest,
}

/// Declared dependencies, split by stage.
///
/// Build dependencies are installed before the build step runs. Runtime
/// dependencies are only surfaced in caveats (and optionally probed for
/// presence); the engine never manages their lifecycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub runtime: Vec<String>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.runtime.is_empty()
    }
}

/// Argument-construction strategy for a build step that does not spell its
/// arguments out literally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgStrategy {
    /// Derive conventional install arguments from the source path alone,
    /// letting the tool's own convention determine the target root.
    StdArgs,
}

/// One build-tool invocation.
///
/// Exactly one of `args` (literal list, `{src}`/`{prefix}` placeholders
/// substituted) or `strategy` must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStep {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ArgStrategy>,
}

/// Post-install advisory template (rendered, never executed).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Caveats {
    #[serde(default)]
    pub text: String,
}

/// Smoke-test descriptor.
///
/// All fields are required: a partial test spec is rejected at parse time.
/// `command` is a template relative to the installed prefix (`{bin}`,
/// `{prefix}` placeholders); `expect_output` is matched as a substring of
/// combined stdout/stderr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    pub command: Vec<String>,
    pub exit_code: i32,
    pub expect_output: String,
}

/// Complete formula definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    #[serde(default)]
    pub formula: FormulaInfo,
    #[serde(rename = "source", default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(rename = "build", default)]
    pub build: Vec<BuildStep>,
    #[serde(default)]
    pub caveats: Caveats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestSpec>,
}

impl Formula {
    /// Parse and validate a formula from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, FormulaError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse and validate a formula from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, FormulaError> {
        let formula: Formula = toml::from_str(content)?;
        formula.validate()?;
        Ok(formula)
    }

    /// Normalized formula name.
    pub fn name(&self) -> FormulaName {
        FormulaName::new(&self.formula.name)
    }

    /// Version label of the newest declared source, if any carries one.
    pub fn latest_version(&self) -> Option<&str> {
        self.sources.first().and_then(|s| s.version.as_deref())
    }

    /// The ordered fetch list for this formula.
    ///
    /// Unpinned, this is the full declared source list (newest first).
    /// Pinned, only entries carrying the matching version label remain;
    /// an empty result means the pin does not name a known version.
    pub fn select_sources(&self, pin: Option<&str>) -> Vec<&Source> {
        match pin {
            None => self.sources.iter().collect(),
            Some(version) => self
                .sources
                .iter()
                .filter(|s| s.version.as_deref() == Some(version))
                .collect(),
        }
    }

    /// Static validation of the invariants the data model promises.
    fn validate(&self) -> Result<(), FormulaError> {
        if self.formula.name.trim().is_empty() {
            return Err(FormulaError::malformed("formula name is required"));
        }
        if self.formula.license.trim().is_empty() {
            return Err(FormulaError::malformed(
                "license is required (use a sentinel value when no standard tag applies)",
            ));
        }
        if self.sources.is_empty() {
            return Err(FormulaError::malformed(
                "at least one [[source]] entry is required",
            ));
        }
        for source in &self.sources {
            if source.url.trim().is_empty() {
                return Err(FormulaError::malformed("source url must not be empty"));
            }
        }

        Self::validate_stage(&self.dependencies.build, "build")?;
        Self::validate_stage(&self.dependencies.runtime, "runtime")?;

        let build: HashSet<&str> = self.dependencies.build.iter().map(String::as_str).collect();
        for name in &self.dependencies.runtime {
            if build.contains(name.as_str()) {
                return Err(FormulaError::malformed(format!(
                    "dependency '{name}' declared in both build and runtime stages"
                )));
            }
        }

        for (i, step) in self.build.iter().enumerate() {
            if step.tool.trim().is_empty() {
                return Err(FormulaError::malformed(format!(
                    "build step {i} has no tool name"
                )));
            }
            match (&step.args, &step.strategy) {
                (Some(_), None) | (None, Some(_)) => {}
                (Some(_), Some(_)) => {
                    return Err(FormulaError::malformed(format!(
                        "build step {i} declares both args and strategy"
                    )));
                }
                (None, None) => {
                    return Err(FormulaError::malformed(format!(
                        "build step {i} declares neither args nor strategy"
                    )));
                }
            }
        }

        if let Some(test) = &self.test {
            if test.command.is_empty() {
                return Err(FormulaError::malformed("test command must not be empty"));
            }
        }

        Ok(())
    }

    fn validate_stage(names: &[String], stage: &str) -> Result<(), FormulaError> {
        let mut seen = HashSet::new();
        for name in names {
            if name.trim().is_empty() {
                return Err(FormulaError::malformed(format!(
                    "{stage} dependency with empty name"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(FormulaError::malformed(format!(
                    "duplicate {stage} dependency '{name}'"
                )));
            }
        }
        Ok(())
    }
}
