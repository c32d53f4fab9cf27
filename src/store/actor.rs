//! Registry actor - serialized access to the record store
//!
//! The record store is plain single-threaded state behind a JSON file.
//! Concurrent install pipelines talk to it through a dedicated background
//! thread and message passing, so record swaps never race.

use std::sync::mpsc;
use std::thread;

use tokio::sync::oneshot;

use super::records::{InstallationRecord, RecordStore, StoreError};
use crate::types::FormulaName;

enum RegistryEvent {
    /// Get the active record for a formula
    Active {
        name: FormulaName,
        resp: oneshot::Sender<Result<Option<InstallationRecord>, StoreError>>,
    },
    /// Commit a record, superseding any prior active record for its name
    Commit {
        record: InstallationRecord,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    /// Mark all records for a formula stale
    MarkStale {
        name: FormulaName,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    /// Shutdown the actor
    Shutdown,
}

/// A handle to the registry actor that is Send + Sync and Clone.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Spawn a new registry actor thread over the store at `path`.
    pub fn spawn(path: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let (sender, receiver) = mpsc::channel();
        let store = RecordStore::open(path)?;

        thread::spawn(move || {
            run_registry_event_loop(store, receiver);
        });

        Ok(Self { sender })
    }

    /// Helper to send a request and wait for the response
    async fn request<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(oneshot::Sender<Result<T, StoreError>>) -> RegistryEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| StoreError::ActorDied)?;
        rx.await.map_err(|_| StoreError::ActorDied)?
    }

    pub async fn active(&self, name: FormulaName) -> Result<Option<InstallationRecord>, StoreError> {
        self.request(|resp| RegistryEvent::Active { name, resp }).await
    }

    pub async fn commit(&self, record: InstallationRecord) -> Result<(), StoreError> {
        self.request(|resp| RegistryEvent::Commit { record, resp })
            .await
    }

    pub async fn mark_stale(&self, name: FormulaName) -> Result<(), StoreError> {
        self.request(|resp| RegistryEvent::MarkStale { name, resp })
            .await
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(RegistryEvent::Shutdown);
    }
}

/// The actual event loop running in the background thread
fn run_registry_event_loop(mut store: RecordStore, receiver: mpsc::Receiver<RegistryEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            RegistryEvent::Active { name, resp } => {
                let _ = resp.send(Ok(store.active(&name).cloned()));
            }
            RegistryEvent::Commit { record, resp } => {
                let _ = resp.send(store.commit(record));
            }
            RegistryEvent::MarkStale { name, resp } => {
                let _ = resp.send(store.mark_stale(&name));
            }
            RegistryEvent::Shutdown => break,
        }
    }
}
