//! Single-slot capture channels.
//!
//! Sensor streams only ever need the newest sample, so each stream is a
//! one-deep overwrite slot rather than a queue. Publishing replaces any
//! unconsumed value, which gives backpressure-by-drop for free: a slow
//! consumer simply skips stale frames.

use std::sync::Arc;

use parking_lot::Mutex;

/// Latest-value slot shared between one producer and one consumer.
///
/// Clones share the same underlying slot.
pub struct LatestSlot<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Replaces the slot's value, dropping any unconsumed one.
    pub fn publish(&self, value: T) {
        *self.inner.lock() = Some(value);
    }

    /// Takes the value out, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.inner.lock().take()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().is_some()
    }
}
