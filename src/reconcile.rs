//! Background reconciliation loops.
//!
//! Two independent periodic tasks keep the registry consistent over time:
//! the unblock loop lifts expired blocks, and the eviction loop drops idle
//! identities. Both stop at the next iteration boundary once cancelled, without
//! a final flush.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::AdmissionEngine;
use crate::error::AdmissionError;

/// Handle to the running reconciliation loops.
#[derive(Debug)]
pub struct Reconciler {
    cancel: CancellationToken,
    unblock: JoinHandle<()>,
    evict: JoinHandle<()>,
}

impl Reconciler {
    /// Spawn both loops on the current tokio runtime.
    ///
    /// Periods come from the engine's config at spawn time. The first tick of
    /// each loop fires one full period after this call.
    pub fn spawn(engine: Arc<AdmissionEngine>, cancel: CancellationToken) -> Self {
        let reconcile = engine.config().reconcile.clone();

        let unblock = {
            let engine = engine.clone();
            spawn_periodic("unblock", reconcile.unblock_interval, cancel.clone(), move || {
                let engine = engine.clone();
                async move { engine.unblock_expired().await }
            })
        };
        let evict = spawn_periodic("evict", reconcile.eviction_interval, cancel.clone(), move || {
            let engine = engine.clone();
            async move { engine.evict_idle().await }
        });

        Self { cancel, unblock, evict }
    }

    /// Token observed by both loops.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether both loops have exited.
    pub fn is_finished(&self) -> bool {
        self.unblock.is_finished() && self.evict.is_finished()
    }

    /// Cancel both loops and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in [("unblock", self.unblock), ("evict", self.evict)] {
            if let Err(e) = handle.await {
                warn!(target: "gatekeeper::reconcile", task = name, error = %e, "reconcile task ended abnormally");
            }
        }
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<String>, AdmissionError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(target: "gatekeeper::reconcile", task = name, "reconcile loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match tick().await {
                        Ok(ids) if !ids.is_empty() => {
                            debug!(target: "gatekeeper::reconcile", task = name, count = ids.len(), "reconcile pass applied");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(target: "gatekeeper::reconcile", task = name, error = %e, "reconcile pass could not persist");
                        }
                    }
                }
            }
        }
    })
}
