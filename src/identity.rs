//! Identity records tracked by the registry.

use serde::{Deserialize, Serialize};

use crate::limiter::TokenBucket;

/// How a client was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    /// Keyed by network address; limited by the global per-address ceiling.
    Address,
    /// Keyed by API token; limited by that token's configured ceiling.
    Token,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKind::Address => write!(f, "address"),
            IdentityKind::Token => write!(f, "token"),
        }
    }
}

/// One tracked client.
///
/// The token bucket is transient: it is skipped on serialization and rebuilt
/// from configuration whenever records are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Address or token value; unique registry key.
    pub id: String,
    pub kind: IdentityKind,
    /// Epoch millis of the most recent request for this identity.
    pub last_seen: u64,
    pub blocked: bool,
    /// Epoch millis the block expires at; `0` when not blocked.
    pub blocked_until: u64,
    #[serde(skip)]
    pub limiter: TokenBucket,
}

impl IdentityRecord {
    /// A fresh, unblocked record with a full bucket.
    pub fn new(id: impl Into<String>, kind: IdentityKind, ceiling: u32, now_millis: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            last_seen: now_millis,
            blocked: false,
            blocked_until: 0,
            limiter: TokenBucket::new(ceiling, now_millis),
        }
    }

    /// Enter the blocked state until `until_millis`.
    pub fn block(&mut self, until_millis: u64) {
        self.blocked = true;
        self.blocked_until = until_millis;
    }

    /// Leave the blocked state and reset the expiry to its zero value.
    pub fn unblock(&mut self) {
        self.blocked = false;
        self.blocked_until = 0;
    }

    /// Blocked and the block has run out at `now_millis`.
    pub fn block_expired(&self, now_millis: u64) -> bool {
        self.blocked && now_millis >= self.blocked_until
    }

    /// Not seen for strictly longer than `idle_millis`.
    pub fn is_idle(&self, now_millis: u64, idle_millis: u64) -> bool {
        now_millis.saturating_sub(self.last_seen) > idle_millis
    }
}
