pub mod digest;
pub mod name;

pub use digest::Sha256Digest;
pub use name::FormulaName;
