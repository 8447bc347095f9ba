//! Store health signal
//!
//! A cloneable flag shared between the counts store and whoever owns the
//! surrounding database. Once panicked it stays unhealthy; blocking waits
//! inside the store re-check it so they fail instead of hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CountsError, Result};

#[derive(Debug, Default)]
struct HealthInner {
    panicked: AtomicBool,
    cause: Mutex<Option<String>>,
}

/// Shared health signal
#[derive(Debug, Clone, Default)]
pub struct StoreHealth {
    inner: Arc<HealthInner>,
}

impl StoreHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the store unhealthy. The first cause wins.
    pub fn panic(&self, cause: impl Into<String>) {
        let cause = cause.into();
        let mut slot = self.inner.cause.lock();
        if slot.is_none() {
            tracing::error!(%cause, "Counts store health panic");
            *slot = Some(cause);
        }
        self.inner.panicked.store(true, Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        !self.inner.panicked.load(Ordering::Acquire)
    }

    /// `Ok(())` while healthy, otherwise the recorded cause
    pub fn check(&self) -> Result<()> {
        if self.is_healthy() {
            return Ok(());
        }
        let cause = self
            .inner
            .cause
            .lock()
            .clone()
            .unwrap_or_else(|| "unknown cause".to_string());
        Err(CountsError::Unhealthy(cause))
    }
}
