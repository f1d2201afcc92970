#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Gatekeeper
//!
//! Per-identity request admission control: decide whether a client (network
//! address or API token) may proceed, based on a requests-per-second ceiling,
//! and block offenders for a cool-down window.
//!
//! ## Features
//!
//! - **Token-bucket ceilings** per address, or per configured API token
//! - **Temporary blocking** once a ceiling is exceeded
//! - **Background reconciliation** lifting expired blocks and evicting idle identities
//! - **Pluggable persistence** behind the [`RecordStore`] capability
//! - **Tower middleware** for putting the engine in front of any service
//!
//! ## Quick Start
//!
//! ```rust
//! use gatekeeper::{AdmissionConfig, AdmissionEngine, Reconciler};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AdmissionConfig::new(Duration::from_secs(3), 10).with_token("abc123", 100);
//!     let engine = Arc::new(AdmissionEngine::builder(config).build().await.unwrap());
//!     let reconciler = Reconciler::spawn(engine.clone(), CancellationToken::new());
//!
//!     let admitted = engine.allow("127.0.0.1", Some("abc123")).await.unwrap();
//!     assert!(admitted);
//!
//!     reconciler.shutdown().await;
//! }
//! ```

pub mod clock;
pub mod config;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod middleware;
pub mod reconcile;
pub mod registry;
pub mod store;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AdmissionConfig, ReconcileConfig};
pub use engine::{AdmissionEngine, AdmissionEngineBuilder, ResolvedIdentity};
pub use error::{AdmissionError, ConfigError, GuardError, StoreError};
pub use identity::{IdentityKind, IdentityRecord};
pub use limiter::TokenBucket;
pub use middleware::{AdmissionLayer, AdmissionService, IdentityExtractor};
pub use reconcile::Reconciler;
pub use registry::{IdentityRegistry, RecordSet};
pub use store::{InMemoryRecordStore, RecordStore};
