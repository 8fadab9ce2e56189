//! Deadline Timer
//!
//! One-shot safety-net timer with cancel. Canceling an already-fired or
//! already-canceled timer is a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One-shot timer.
pub struct DeadlineTimer;

impl DeadlineTimer {
    /// Schedule `on_fire` to run once after `duration`, unless canceled
    /// through the returned handle first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(duration: Duration, on_fire: F) -> DeadlineHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let canceled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&canceled);

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if !flag.load(Ordering::SeqCst) {
                on_fire();
            }
        });

        DeadlineHandle { canceled }
    }
}

// =============================================================================
// Deadline Handle
// =============================================================================

/// Handle to a scheduled one-shot firing.
pub struct DeadlineHandle {
    canceled: Arc<AtomicBool>,
}

impl DeadlineHandle {
    /// Suppress a pending firing. Safe no-op if the timer already fired or
    /// was already canceled.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Tests
// =============================================================================
