//! Source fetching with ordered fallback and streaming verification
//!
//! Sources are attempted in declared order. Transport-level failures
//! (unreachable host, timeout, non-success status) are recoverable and
//! advance to the next source; exhausting the list is fatal. A checksum
//! mismatch on successfully fetched bytes is fatal immediately: that
//! signals tampering or corruption, not unavailability, and must never
//! fall through to another source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::core::formula::Source;
use crate::types::{FormulaName, Sha256Digest};
use crate::ui::Reporter;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {seconds}s: {url}")]
    TimedOut { url: String, seconds: u64 },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("all sources exhausted for '{name}': {}", attempts.join("; "))]
    Exhausted {
        name: FormulaName,
        attempts: Vec<String>,
    },
}

impl FetchError {
    /// Whether the failure is a transport-level condition that permits
    /// falling back to the next declared source.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Io(_) | Self::TimedOut { .. })
    }
}

/// A fetched-and-verified source archive.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub url: String,
    pub version: Option<String>,
    pub digest: Sha256Digest,
    pub archive: PathBuf,
}

/// Verify a file on disk against a declared digest.
///
/// Verification is deterministic: re-verifying identical bytes against the
/// same digest always yields the same result.
pub fn verify_file(path: &Path, expected: &Sha256Digest) -> Result<Sha256Digest, FetchError> {
    let actual = Sha256Digest::of_file(path)?;
    if actual != *expected {
        return Err(FetchError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(actual)
}

/// Downloads source archives into a digest-keyed cache.
pub struct Fetcher<'a> {
    client: &'a Client,
    cache_dir: PathBuf,
    timeout: Duration,
}

impl<'a> Fetcher<'a> {
    pub fn new(client: &'a Client, cache_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
            timeout,
        }
    }

    /// Fetch the first reachable source whose payload verifies.
    ///
    /// The returned archive lives in the cache, keyed by its digest. A
    /// cached file is re-verified before reuse; a corrupt cache entry is
    /// discarded and downloaded fresh.
    pub async fn fetch<R: Reporter>(
        &self,
        name: &FormulaName,
        sources: &[&Source],
        reporter: &R,
    ) -> Result<FetchedSource, FetchError> {
        std::fs::create_dir_all(&self.cache_dir)?;

        let mut attempts = Vec::new();

        for source in sources {
            let dest = self.cache_dir.join(source.sha256.as_str());

            if dest.exists() {
                match verify_file(&dest, &source.sha256) {
                    Ok(digest) => {
                        tracing::debug!(url = %source.url, "cache hit");
                        return Ok(FetchedSource {
                            url: source.url.clone(),
                            version: source.version.clone(),
                            digest,
                            archive: dest,
                        });
                    }
                    Err(_) => {
                        tracing::warn!(path = %dest.display(), "discarding corrupt cache entry");
                        let _ = std::fs::remove_file(&dest);
                    }
                }
            }

            reporter.fetching(name, &source.url);

            match self.attempt(&source.url, &dest, &source.sha256).await {
                Ok(digest) => {
                    return Ok(FetchedSource {
                        url: source.url.clone(),
                        version: source.version.clone(),
                        digest,
                        archive: dest,
                    });
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(url = %source.url, error = %e, "fetch attempt failed, trying next source");
                    reporter.fetch_retry(name, &source.url, &e.to_string());
                    attempts.push(format!("{}: {e}", source.url));
                }
                Err(fatal) => return Err(fatal),
            }
        }

        Err(FetchError::Exhausted {
            name: name.clone(),
            attempts,
        })
    }

    /// One download attempt with streaming hash computation.
    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        expected: &Sha256Digest,
    ) -> Result<Sha256Digest, FetchError> {
        let download = async {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
                .send()
                .await?
                .error_for_status()?;

            let mut file = tokio::fs::File::create(dest).await?;
            let mut stream = response.bytes_stream();
            let mut hasher = Sha256::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                hasher.update(&chunk);
            }

            file.flush().await?;
            Ok::<_, FetchError>(Sha256Digest::from_hasher_hex(hex::encode(hasher.finalize())))
        };

        let actual = match tokio::time::timeout(self.timeout, download).await {
            Ok(result) => result.inspect_err(|_| {
                let _ = std::fs::remove_file(dest);
            })?,
            Err(_) => {
                let _ = std::fs::remove_file(dest);
                return Err(FetchError::TimedOut {
                    url: url.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if actual != *expected {
            let _ = std::fs::remove_file(dest);
            return Err(FetchError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(actual)
    }
}
