//! Generation Tracker
//!
//! Process-wide monotonic epoch counter: a cheap "did anything else update
//! since I last checked" signal across asynchronous gaps, avoiding the cost
//! of tracking *which* other updates occurred.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic update epoch. Starts at 0, never decreases.
#[derive(Debug, Default)]
pub struct Generation {
    counter: AtomicU64,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the epoch. Called exactly once at the start of each
    /// force-re-render step.
    pub fn enter(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Current epoch value.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Tests
// =============================================================================
