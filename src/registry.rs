//! Registry of tracked identities.
//!
//! The registry is the only shared mutable state in the engine. A single mutex
//! covers every read, insert, update and delete; callers never see the map
//! itself, only atomic operations on it. Anything slow (persistence) happens on
//! a point-in-time [`snapshot`](IdentityRegistry::snapshot), outside the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::identity::IdentityRecord;

/// Point-in-time copy of every record, keyed by id.
pub type RecordSet = HashMap<String, IdentityRecord>;

/// Concurrency-safe map of identity id to record.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    inner: Arc<Mutex<RecordSet>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from previously loaded records.
    ///
    /// Entries are re-keyed by their own `id`, so one record per id holds even
    /// if the source map was keyed inconsistently.
    pub fn from_records(records: RecordSet) -> Self {
        let map = records.into_values().map(|record| (record.id.clone(), record)).collect();
        Self { inner: Arc::new(Mutex::new(map)) }
    }

    /// Run `update` on the record for `id`, inserting `create()` first if absent.
    ///
    /// `update` receives `true` as its second argument when the record was just
    /// created. The whole read-modify-write happens in one critical section.
    pub fn upsert_with<R>(
        &self,
        id: &str,
        create: impl FnOnce() -> IdentityRecord,
        update: impl FnOnce(&mut IdentityRecord, bool) -> R,
    ) -> R {
        let mut map = self.lock();
        match map.get_mut(id) {
            Some(record) => update(record, false),
            None => {
                let record = map.entry(id.to_string()).or_insert_with(create);
                update(record, true)
            }
        }
    }

    /// Run `update` on an existing record; `None` if `id` is not tracked.
    pub fn update<R>(&self, id: &str, update: impl FnOnce(&mut IdentityRecord) -> R) -> Option<R> {
        self.lock().get_mut(id).map(update)
    }

    /// Apply `f` to every record.
    pub fn update_all(&self, mut f: impl FnMut(&mut IdentityRecord)) {
        self.lock().values_mut().for_each(|record| f(record));
    }

    /// Remove `id` only if `predicate` still holds for it.
    pub fn remove_if(
        &self,
        id: &str,
        predicate: impl FnOnce(&IdentityRecord) -> bool,
    ) -> Option<IdentityRecord> {
        let mut map = self.lock();
        if map.get(id).is_some_and(predicate) {
            map.remove(id)
        } else {
            None
        }
    }

    /// Ids of the records matching `predicate`, sorted.
    pub fn select(&self, mut predicate: impl FnMut(&IdentityRecord) -> bool) -> Vec<String> {
        let map = self.lock();
        let mut ids: Vec<String> =
            map.values().filter(|record| predicate(record)).map(|r| r.id.clone()).collect();
        ids.sort();
        ids
    }

    /// Clone of the record for `id`.
    pub fn get(&self, id: &str) -> Option<IdentityRecord> {
        self.lock().get(id).cloned()
    }

    /// Copy of the full record set.
    pub fn snapshot(&self) -> RecordSet {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Poisoning is ignored: records are plain data.
    fn lock(&self) -> MutexGuard<'_, RecordSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
