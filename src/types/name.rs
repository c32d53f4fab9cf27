/// A normalized formula name.
///
/// Formula names are automatically lowercased to ensure consistent lookups
/// and comparisons. This prevents issues with case-sensitive names
/// like `Arliamp` vs `arliamp`.
///
/// # Example
///
/// ```
/// use alembic::types::FormulaName;
///
/// let name = FormulaName::new("Arliamp");
/// assert_eq!(name.as_str(), "arliamp");
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct FormulaName(String);

impl FormulaName {
    /// Create a new formula name, automatically normalizing to lowercase.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// Get the normalized name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<std::ffi::OsStr> for FormulaName {
    fn as_ref(&self) -> &std::ffi::OsStr {
        self.0.as_ref()
    }
}

impl AsRef<std::path::Path> for FormulaName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl std::fmt::Display for FormulaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for FormulaName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for FormulaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for FormulaName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for FormulaName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl PartialEq<&str> for FormulaName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl From<&str> for FormulaName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FormulaName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}
