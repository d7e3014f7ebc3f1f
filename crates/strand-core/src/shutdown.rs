//! Cooperative shutdown.
//!
//! A single process-wide flag, polled before and after every blocking
//! `recv`/`send` loop. When set, the in-flight operation is abandoned and the
//! worker returns without reporting an error. The flag is the only
//! cancellation channel the core knows about; timeouts belong to the external
//! poll loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared shutdown flag. Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    inner: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Creates a flag in the running (unset) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent: any number of calls from any thread
    /// leaves the flag set.
    pub fn trigger(&self) {
        self.inner.store(true, Ordering::Release);
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}
