//! Token-bucket rate primitive.
//!
//! Answers one question: is one more unit available right now? Blocking is
//! layered above this by the [`AdmissionEngine`](crate::AdmissionEngine).

/// A token bucket whose burst size and refill rate both equal the ceiling.
///
/// Up to `ceiling` calls may be admitted instantaneously; the bucket then refills
/// continuously at `ceiling` tokens per second. A ceiling of zero always denies.
///
/// Time is supplied by the caller in epoch milliseconds so the bucket stays
/// deterministic under a [`ManualClock`](crate::clock::ManualClock).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    capacity: u32,
    tokens: f64,
    last_refill_millis: u64,
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl TokenBucket {
    /// Create a full bucket for `ceiling` requests per second.
    pub fn new(ceiling: u32, now_millis: u64) -> Self {
        Self { capacity: ceiling, tokens: f64::from(ceiling), last_refill_millis: now_millis }
    }

    /// Consume one token if available.
    pub fn allow(&mut self, now_millis: u64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        self.refill(now_millis);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available at `now_millis`, without consuming any.
    pub fn available(&self, now_millis: u64) -> f64 {
        let mut peek = self.clone();
        peek.refill(now_millis);
        peek.tokens
    }

    /// Burst size and per-second refill rate.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn refill(&mut self, now_millis: u64) {
        // Clock moved backwards: keep the old reference point.
        if now_millis <= self.last_refill_millis {
            return;
        }
        let elapsed_secs = (now_millis - self.last_refill_millis) as f64 / 1_000.0;
        let capacity = f64::from(self.capacity);
        self.tokens = (self.tokens + elapsed_secs * capacity).min(capacity);
        self.last_refill_millis = now_millis;
    }
}
