//! Error types for admission control.
//!
//! A denied request is never an error: [`AdmissionEngine::allow`](crate::AdmissionEngine::allow)
//! returns `Ok(false)`. Errors here describe infrastructure trouble only.

use crate::identity::IdentityKind;

/// Failures reported by a [`RecordStore`](crate::store::RecordStore) backend.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    /// Stored data could not be decoded.
    #[error("record store corrupt: {0}")]
    Corrupt(String),
    /// Local I/O failure.
    #[error("record store i/o: {0}")]
    Io(#[from] std::io::Error),
    /// Records could not be encoded.
    #[error("record serialization: {0}")]
    Serialization(String),
}

/// Errors returned by the admission engine.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum AdmissionError {
    /// The write-through after a mutation failed.
    ///
    /// The in-memory state already reflects the mutation and stays authoritative;
    /// a later successful flush makes it durable.
    #[error("failed to persist identity records: {0}")]
    Persistence(#[source] StoreError),
}

impl AdmissionError {
    /// Whether the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdmissionError::Persistence(StoreError::Corrupt(_))
            | AdmissionError::Persistence(StoreError::Serialization(_)) => false,
            AdmissionError::Persistence(_) => true,
        }
    }

    /// Borrow the underlying store error.
    pub fn store_error(&self) -> &StoreError {
        match self {
            AdmissionError::Persistence(e) => e,
        }
    }
}

/// Errors produced when loading or validating configuration.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// Input was not valid TOML for [`AdmissionConfig`](crate::config::AdmissionConfig).
    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field holds a value outside its domain.
    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Error returned by [`AdmissionService`](crate::middleware::AdmissionService).
#[derive(thiserror::Error, Debug)]
pub enum GuardError<E> {
    /// The identity is over its ceiling or blocked.
    #[error("request rejected for {kind} identity {identity}")]
    Rejected {
        /// Resolved identity id.
        identity: String,
        /// Whether the address or token was limited.
        kind: IdentityKind,
    },
    /// The engine could not record the decision.
    #[error("admission unavailable: {0}")]
    Unavailable(#[source] AdmissionError),
    /// The wrapped service failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> GuardError<E> {
    /// Check if the request was rejected by the rate check.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Get the inner error if this is an Inner variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
