//! Installation records and their on-disk store

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FormulaName, Sha256Digest};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("registry actor died")]
    ActorDied,
}

/// One completed installation.
///
/// Produced exclusively by the installer, read-only everywhere else.
/// Reinstalling supersedes the record (the old one is marked stale, never
/// mutated or deleted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub name: FormulaName,
    /// Version label of the source actually installed, when declared.
    pub version: Option<String>,
    pub url: String,
    pub sha256: Sha256Digest,
    pub prefix: PathBuf,
    /// Staged file paths, relative to the prefix.
    pub manifest: Vec<PathBuf>,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub stale: bool,
}

/// Name-keyed record store with JSON write-through.
pub struct RecordStore {
    path: PathBuf,
    records: Vec<InstallationRecord>,
}

impl RecordStore {
    /// Open the store at `path`, creating an empty one if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };
        Ok(Self { path, records })
    }

    /// The active (non-stale) record for a formula, if any.
    pub fn active(&self, name: &FormulaName) -> Option<&InstallationRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| &r.name == name && !r.stale)
    }

    /// Commit a new record, superseding any active record for the same
    /// name. The prior record is marked stale and kept.
    pub fn commit(&mut self, record: InstallationRecord) -> Result<(), StoreError> {
        for existing in &mut self.records {
            if existing.name == record.name {
                existing.stale = true;
            }
        }
        self.records.push(record);
        self.save()
    }

    /// Mark every record for `name` stale without adding a replacement.
    pub fn mark_stale(&mut self, name: &FormulaName) -> Result<(), StoreError> {
        for existing in &mut self.records {
            if &existing.name == name {
                existing.stale = true;
            }
        }
        self.save()
    }

    /// All records, newest last, stale included.
    pub fn history(&self, name: &FormulaName) -> Vec<&InstallationRecord> {
        self.records.iter().filter(|r| &r.name == name).collect()
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.records)?;

        // Atomic write: temp file in the same directory, then rename
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// Construct a record for a freshly staged prefix.
pub fn record_for(
    name: FormulaName,
    version: Option<String>,
    url: String,
    sha256: Sha256Digest,
    prefix: &Path,
    manifest: Vec<PathBuf>,
) -> InstallationRecord {
    InstallationRecord {
        name,
        version,
        url,
        sha256,
        prefix: prefix.to_path_buf(),
        manifest,
        installed_at: Utc::now(),
        stale: false,
    }
}
