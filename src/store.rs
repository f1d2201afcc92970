use async_trait::async_trait;

use crate::error::StoreError;
use crate::registry::RecordSet;

/// Durable storage for the registry's identity records.
///
/// Both operations are whole-collection: the engine never asks for a single
/// record. Token-bucket state is not part of what a backend stores.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Load every stored record, keyed by id.
    async fn load_all(&self) -> Result<RecordSet, StoreError>;

    /// Replace the stored collection with `records`.
    async fn save_all(&self, records: &RecordSet) -> Result<(), StoreError>;
}

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Simple in-memory record store.
///
/// Clones share the same data. [`set_failing`](Self::set_failing) makes every
/// call fail with [`StoreError::Unavailable`], for exercising error paths.
#[derive(Default, Clone, Debug)]
pub struct InMemoryRecordStore {
    data: Arc<Mutex<RecordSet>>,
    failing: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records.
    pub fn with_records(records: RecordSet) -> Self {
        let store = Self::default();
        *store.data.lock().unwrap_or_else(PoisonError::into_inner) = records;
        store
    }

    /// Toggle simulated backend failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Copy of what is currently stored.
    pub fn records(&self) -> RecordSet {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of successful `save_all` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load_all(&self) -> Result<RecordSet, StoreError> {
        self.check()?;
        Ok(self.records())
    }

    async fn save_all(&self, records: &RecordSet) -> Result<(), StoreError> {
        self.check()?;
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = records.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(target: "gatekeeper::store", records = records.len(), "in-memory records replaced");
        Ok(())
    }
}
