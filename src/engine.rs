//! Admission engine: per-identity rate check with temporary blocking.
//!
//! Each identity moves through `Unseen → Active ⇄ Blocked`:
//!
//! - **Unseen → Active**: first request. Always admitted; the fresh bucket is
//!   charged for it.
//! - **Active → Blocked**: the bucket is empty. The identity is denied until
//!   `blocked_until`, and requests made meanwhile consume nothing.
//! - **Blocked → Active**: only via [`AdmissionEngine::unblock_expired`], never
//!   inline in [`AdmissionEngine::allow`]. A request arriving after expiry but
//!   before the next unblock pass is still denied.
//! - **Active → removed**: via [`AdmissionEngine::evict_idle`]; the next request
//!   starts over as unseen.
//!
//! Every mutation is written through to the [`RecordStore`] as a whole-collection
//! snapshot taken outside the registry lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::AdmissionConfig;
use crate::dynamic::DynamicConfig;
use crate::error::{AdmissionError, ConfigError};
use crate::identity::{IdentityKind, IdentityRecord};
use crate::limiter::TokenBucket;
use crate::registry::{IdentityRegistry, RecordSet};
use crate::store::{InMemoryRecordStore, RecordStore};

/// The identity a request is charged to, and its ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub id: String,
    pub kind: IdentityKind,
    pub ceiling: u32,
}

impl ResolvedIdentity {
    /// A token with a configured ceiling wins; anything else falls back to the address.
    pub fn resolve(config: &AdmissionConfig, address: &str, token: Option<&str>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if let Some(ceiling) = config.token_ceiling(token) {
                return Self { id: token.to_string(), kind: IdentityKind::Token, ceiling };
            }
        }
        Self {
            id: address.to_string(),
            kind: IdentityKind::Address,
            ceiling: config.address_max_per_second,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    FirstSighting,
    Admitted,
    StillBlocked { until: u64 },
    NewlyBlocked { until: u64 },
}

impl Outcome {
    fn is_admitted(self) -> bool {
        matches!(self, Outcome::FirstSighting | Outcome::Admitted)
    }
}

/// Decides, per identity, whether the current request may proceed.
///
/// Share it behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct AdmissionEngine {
    registry: IdentityRegistry,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: DynamicConfig<AdmissionConfig>,
    save_lock: tokio::sync::Mutex<()>,
    dirty: AtomicBool,
}

/// Builder for [`AdmissionEngine`].
#[derive(Debug)]
pub struct AdmissionEngineBuilder {
    config: AdmissionConfig,
    store: Option<Arc<dyn RecordStore>>,
    clock: Arc<dyn Clock>,
}

impl AdmissionEngineBuilder {
    /// Persistence backend. Defaults to a fresh [`InMemoryRecordStore`].
    pub fn store<S: RecordStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Persistence backend shared with other owners.
    pub fn shared_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate the config, load persisted records and build the engine.
    ///
    /// A failing load is not fatal: it is logged and the engine starts empty.
    pub async fn build(self) -> Result<AdmissionEngine, ConfigError> {
        self.config.validate()?;
        let store = self.store.unwrap_or_else(|| Arc::new(InMemoryRecordStore::new()));

        let loaded = match store.load_all().await {
            Ok(records) => {
                info!(target: "gatekeeper::engine", count = records.len(), "identity records loaded");
                records
            }
            Err(e) => {
                warn!(target: "gatekeeper::engine", error = %e, "failed to load identity records; starting clean");
                RecordSet::new()
            }
        };

        let now = self.clock.now_millis();
        let registry = IdentityRegistry::from_records(loaded);
        registry.update_all(|record| {
            let ceiling = self.config.ceiling_for(record.kind, &record.id);
            record.limiter = TokenBucket::new(ceiling, now);
        });

        Ok(AdmissionEngine {
            registry,
            store,
            clock: self.clock,
            config: DynamicConfig::new(self.config),
            save_lock: tokio::sync::Mutex::new(()),
            dirty: AtomicBool::new(false),
        })
    }
}

impl AdmissionEngine {
    pub fn builder(config: AdmissionConfig) -> AdmissionEngineBuilder {
        AdmissionEngineBuilder { config, store: None, clock: Arc::new(SystemClock) }
    }

    /// Decide whether a request from `address` (optionally carrying `token`) may proceed.
    ///
    /// `Ok(false)` is a normal denial. An `Err` means the decision was taken and
    /// applied in memory but could not be persisted.
    pub async fn allow(&self, address: &str, token: Option<&str>) -> Result<bool, AdmissionError> {
        let config = self.config.get();
        let identity = ResolvedIdentity::resolve(&config, address, token);
        let now = self.clock.now_millis();
        let blocking = millis(config.blocking_duration);

        let outcome = self.registry.upsert_with(
            &identity.id,
            || IdentityRecord::new(identity.id.clone(), identity.kind, identity.ceiling, now),
            |record, created| {
                if created {
                    // Charged, but admitted regardless.
                    record.limiter.allow(now);
                    return Outcome::FirstSighting;
                }
                record.last_seen = now;
                if record.blocked {
                    return Outcome::StillBlocked { until: record.blocked_until };
                }
                if record.limiter.allow(now) {
                    Outcome::Admitted
                } else {
                    let until = now.saturating_add(blocking);
                    record.block(until);
                    Outcome::NewlyBlocked { until }
                }
            },
        );

        match outcome {
            Outcome::FirstSighting => {
                info!(target: "gatekeeper::engine", id = %identity.id, kind = %identity.kind, ceiling = identity.ceiling, "tracking new identity");
            }
            Outcome::Admitted => {
                debug!(target: "gatekeeper::engine", id = %identity.id, kind = %identity.kind, "admitted");
            }
            Outcome::StillBlocked { until } => {
                debug!(target: "gatekeeper::engine", id = %identity.id, blocked_until = until, "denied; identity is blocked");
            }
            Outcome::NewlyBlocked { until } => {
                info!(target: "gatekeeper::engine", id = %identity.id, kind = %identity.kind, blocked_until = until, "ceiling exceeded; blocking identity");
            }
        }

        self.flush().await?;
        Ok(outcome.is_admitted())
    }

    /// One unblock pass: clear every block whose expiry has been reached.
    ///
    /// Returns the unblocked ids, sorted. Also retries a pending flush left by
    /// an earlier failed save.
    pub async fn unblock_expired(&self) -> Result<Vec<String>, AdmissionError> {
        let now = self.clock.now_millis();
        let candidates = self.registry.select(|record| record.block_expired(now));

        let mut unblocked = Vec::with_capacity(candidates.len());
        for id in candidates {
            let cleared = self.registry.update(&id, |record| {
                let expired = record.block_expired(now);
                if expired {
                    record.unblock();
                }
                expired
            });
            if cleared == Some(true) {
                info!(target: "gatekeeper::engine", id = %id, "block expired; unblocking identity");
                unblocked.push(id);
            }
        }

        if !unblocked.is_empty() || self.is_dirty() {
            self.flush().await?;
        }
        Ok(unblocked)
    }

    /// One eviction pass: drop every record unseen for longer than the idle threshold.
    ///
    /// Returns the evicted ids, sorted.
    pub async fn evict_idle(&self) -> Result<Vec<String>, AdmissionError> {
        let now = self.clock.now_millis();
        let idle = millis(self.config.get().reconcile.idle_threshold);
        let candidates = self.registry.select(|record| record.is_idle(now, idle));

        let mut evicted = Vec::with_capacity(candidates.len());
        for id in candidates {
            if self.registry.remove_if(&id, |record| record.is_idle(now, idle)).is_some() {
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            info!(target: "gatekeeper::engine", count = evicted.len(), "evicted idle identities");
            self.flush().await?;
        }
        Ok(evicted)
    }

    /// Write the full record set to the store.
    ///
    /// Saves are serialized and each one snapshots the registry only after it
    /// is next in line, so stored state never moves backwards.
    pub async fn flush(&self) -> Result<(), AdmissionError> {
        let _turn = self.save_lock.lock().await;
        let snapshot = self.registry.snapshot();
        match self.store.save_all(&snapshot).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                warn!(target: "gatekeeper::engine", error = %e, records = snapshot.len(), "failed to persist identity records");
                Err(AdmissionError::Persistence(e))
            }
        }
    }

    /// Swap in a new configuration.
    ///
    /// Records whose resolved ceiling changed get a fresh bucket at the new
    /// ceiling; the rest keep their current bucket.
    pub fn reconfigure(&self, config: AdmissionConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let now = self.clock.now_millis();
        self.registry.update_all(|record| {
            let ceiling = config.ceiling_for(record.kind, &record.id);
            if record.limiter.capacity() != ceiling {
                record.limiter = TokenBucket::new(ceiling, now);
            }
        });
        info!(target: "gatekeeper::engine", tokens = config.token_ceilings.len(), "admission config replaced");
        self.config.set(config);
        Ok(())
    }

    /// Which identity a request would be charged to under the current config.
    pub fn resolve(&self, address: &str, token: Option<&str>) -> ResolvedIdentity {
        ResolvedIdentity::resolve(&self.config.get(), address, token)
    }

    /// Copy of the record for `id`.
    pub fn record(&self, id: &str) -> Option<IdentityRecord> {
        self.registry.get(id)
    }

    /// Copy of every tracked record.
    pub fn snapshot(&self) -> RecordSet {
        self.registry.snapshot()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Whether the last save failed and the store is behind memory.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<AdmissionConfig> {
        self.config.get()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
