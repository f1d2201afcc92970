//! Live-swappable configuration handle.
//!
//! Default uses `ArcSwap` for lock-free reads on the request path; feature
//! `dynamic-rwlock` switches to an `RwLock`.

use std::sync::Arc;

#[cfg(feature = "dynamic-rwlock")]
use std::sync::RwLock;

#[cfg(not(feature = "dynamic-rwlock"))]
use arc_swap::ArcSwap;

/// `DynamicConfig<T>` gives cheap reads and whole-value replacement.
///
/// Clones share the same value.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    #[cfg(not(feature = "dynamic-rwlock"))]
    inner: Arc<ArcSwap<T>>,
    #[cfg(feature = "dynamic-rwlock")]
    inner: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        #[cfg(not(feature = "dynamic-rwlock"))]
        {
            Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
        }
        #[cfg(feature = "dynamic-rwlock")]
        {
            Self { inner: Arc::new(RwLock::new(Arc::new(value))) }
        }
    }

    /// Snapshot the current value (cheap clone of Arc).
    pub fn get(&self) -> Arc<T> {
        #[cfg(not(feature = "dynamic-rwlock"))]
        {
            self.inner.load_full()
        }
        #[cfg(feature = "dynamic-rwlock")]
        {
            self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
        }
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        #[cfg(not(feature = "dynamic-rwlock"))]
        {
            self.inner.store(Arc::new(value));
        }
        #[cfg(feature = "dynamic-rwlock")]
        {
            *self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(value);
        }
    }
}
