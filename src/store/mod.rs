//! Installation registry - records of what is installed where
//!
//! The registry is a name-keyed store of installation records. Persistence
//! lives behind [`RegistryHandle`]; nothing outside this module depends on
//! the on-disk format.

pub mod actor;
pub mod records;

pub use actor::RegistryHandle;
pub use records::{InstallationRecord, RecordStore, StoreError};
