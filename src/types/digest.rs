use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// A validated SHA256 digest (64 hex characters, stored lowercase).
///
/// This newtype ensures that all digests in the system are validated at
/// construction and deserialization time, preventing invalid hex strings
/// from propagating through the codebase. Comparison is effectively
/// case-insensitive because input is normalized on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Create a new digest, validating the input.
    ///
    /// Accepts strings with or without a "sha256:" prefix.
    /// Returns an error if the digest is not exactly 64 hex characters.
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        let hex = s.strip_prefix("sha256:").unwrap_or(&s);

        if hex.len() != 64 {
            return Err(format!(
                "invalid SHA256 digest: expected 64 hex characters, got {} in '{s}'",
                hex.len(),
            ));
        }

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "invalid SHA256 digest: contains non-hex characters in '{s}'"
            ));
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Compute the digest of a byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Compute the digest of a file by streaming its contents.
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Wrap an already-finalized hex string produced by a streaming hasher.
    ///
    /// Callers must only pass `hex::encode` output; this skips validation.
    pub(crate) fn from_hasher_hex(hex: String) -> Self {
        Self(hex)
    }

    /// Get the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_hex() {
        let digest = Sha256Digest::new("a".repeat(64)).unwrap();
        assert_eq!(digest.as_str().len(), 64);
    }

    #[test]
    fn normalizes_case() {
        let upper = Sha256Digest::new("ABCDEF".repeat(10) + "ABCD").unwrap();
        let lower = Sha256Digest::new("abcdef".repeat(10) + "abcd").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn strips_prefix() {
        let digest = Sha256Digest::new(format!("sha256:{}", "0".repeat(64))).unwrap();
        assert_eq!(digest.as_str(), "0".repeat(64));
    }

    #[test]
    fn rejects_short_input() {
        assert!(Sha256Digest::new("abc123").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(Sha256Digest::new("z".repeat(64)).is_err());
    }

    #[test]
    fn compute_is_deterministic() {
        let a = Sha256Digest::of_bytes(b"payload");
        let b = Sha256Digest::of_bytes(b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn file_and_bytes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"some bytes").unwrap();

        assert_eq!(
            Sha256Digest::of_file(&path).unwrap(),
            Sha256Digest::of_bytes(b"some bytes")
        );
    }
}
