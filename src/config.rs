//! Admission configuration.
//!
//! Loaded once at startup (typically from TOML) and held by the engine in a
//! [`DynamicConfig`](crate::dynamic::DynamicConfig) so it can be swapped live.
//!
//! ```toml
//! blocking_duration_ms = 3000
//! address_max_per_second = 10
//!
//! [token_ceilings]
//! abc123 = 100
//!
//! [reconcile]
//! unblock_interval_ms = 1000
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::IdentityKind;

/// Ceilings and blocking policy consumed by the admission engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Cool-down applied once an identity exceeds its ceiling.
    #[serde(rename = "blocking_duration_ms", with = "duration_ms")]
    pub blocking_duration: Duration,
    /// Requests per second allowed for each network address.
    #[serde(default)]
    pub address_max_per_second: u32,
    /// Requests per second for each known API token.
    #[serde(default)]
    pub token_ceilings: HashMap<String, u32>,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Timings for the background reconciliation loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Period of the unblock loop.
    #[serde(rename = "unblock_interval_ms", with = "duration_ms")]
    pub unblock_interval: Duration,
    /// Period of the idle-eviction loop.
    #[serde(rename = "eviction_interval_ms", with = "duration_ms")]
    pub eviction_interval: Duration,
    /// Records unseen for longer than this are evicted.
    #[serde(rename = "idle_threshold_ms", with = "duration_ms")]
    pub idle_threshold: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            unblock_interval: Duration::from_secs(1),
            eviction_interval: Duration::from_secs(3 * 60),
            idle_threshold: Duration::from_secs(3 * 60),
        }
    }
}

impl AdmissionConfig {
    /// Config with no token ceilings and default reconciliation timings.
    pub fn new(blocking_duration: Duration, address_max_per_second: u32) -> Self {
        Self {
            blocking_duration,
            address_max_per_second,
            token_ceilings: HashMap::new(),
            reconcile: ReconcileConfig::default(),
        }
    }

    /// Add or replace a token ceiling.
    pub fn with_token(mut self, token: impl Into<String>, ceiling: u32) -> Self {
        self.token_ceilings.insert(token.into(), ceiling);
        self
    }

    /// Override the reconciliation timings.
    pub fn with_reconcile(mut self, reconcile: ReconcileConfig) -> Self {
        self.reconcile = reconcile;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocking_duration.is_zero() {
            return Err(ConfigError::Invalid {
                field: "blocking_duration_ms",
                reason: "must be > 0",
            });
        }
        let reconcile = &self.reconcile;
        for (field, value) in [
            ("unblock_interval_ms", reconcile.unblock_interval),
            ("eviction_interval_ms", reconcile.eviction_interval),
            ("idle_threshold_ms", reconcile.idle_threshold),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid { field, reason: "must be > 0" });
            }
        }
        Ok(())
    }

    /// Configured ceiling for `token`, if it is a known token.
    pub fn token_ceiling(&self, token: &str) -> Option<u32> {
        self.token_ceilings.get(token).copied()
    }

    /// Ceiling for an already-classified identity.
    ///
    /// Tokens without a configured ceiling get zero, i.e. no admission beyond
    /// the first sighting.
    pub fn ceiling_for(&self, kind: IdentityKind, id: &str) -> u32 {
        match kind {
            IdentityKind::Address => self.address_max_per_second,
            IdentityKind::Token => self.token_ceiling(id).unwrap_or(0),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
