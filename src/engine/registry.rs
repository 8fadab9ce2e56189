//! Instance Registry
//!
//! Per-module record of live proxy instances. Records are created lazily on
//! first access and live for the process lifetime; module ids are stable for
//! the dev session. The registry holds non-owning references: instances must
//! remove themselves on unmount.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::engine::timer::DeadlineHandle;
use crate::host::{Invalidate, ModuleId};

// =============================================================================
// Proxy Handle
// =============================================================================

/// Identity of one mounted proxy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

/// Non-owning reference to a mounted instance: its identity plus the UI
/// framework's force re-render primitive.
#[derive(Clone)]
pub struct ProxyHandle {
    id: InstanceId,
    invalidate: Arc<dyn Invalidate>,
}

impl ProxyHandle {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn force_render(&self) {
        self.invalidate.force_render();
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProxyHandle").field(&self.id.0).finish()
    }
}

// =============================================================================
// Module Record
// =============================================================================

/// Per-module record: live instances in registration order plus the pending
/// registration deadline, if one is armed.
#[derive(Default)]
pub(crate) struct ModuleRecord {
    instances: Vec<ProxyHandle>,
    pending_timer: Option<DeadlineHandle>,
}

// =============================================================================
// Instance Registry
// =============================================================================

/// Process-scoped registry of mounted proxy instances, keyed by module id.
#[derive(Default)]
pub struct InstanceRegistry {
    records: DashMap<ModuleId, ModuleRecord>,
    next_instance: AtomicU64,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mounted instance under `module`. The record is created on
    /// first access.
    pub fn add(&self, module: &ModuleId, invalidate: Arc<dyn Invalidate>) -> ProxyHandle {
        let handle = ProxyHandle {
            id: InstanceId(self.next_instance.fetch_add(1, Ordering::Relaxed)),
            invalidate,
        };
        self.records
            .entry(module.clone())
            .or_default()
            .instances
            .push(handle.clone());
        handle
    }

    /// Remove an instance by identity. Idempotent: double-unmount and
    /// unmount-before-mount races are both no-ops.
    pub fn remove(&self, module: &ModuleId, handle: &ProxyHandle) {
        if let Some(mut record) = self.records.get_mut(module) {
            record.instances.retain(|h| h.id != handle.id);
        }
    }

    /// Snapshot of live instances for `module`, in registration order.
    pub fn instances(&self, module: &ModuleId) -> Vec<ProxyHandle> {
        self.records
            .get(module)
            .map(|r| r.instances.clone())
            .unwrap_or_default()
    }

    /// Number of live instances for `module`.
    pub fn instance_count(&self, module: &ModuleId) -> usize {
        self.records.get(module).map_or(0, |r| r.instances.len())
    }

    /// Arm the registration deadline for `module`, canceling any previous
    /// one for the same record.
    pub(crate) fn arm_deadline(&self, module: &ModuleId, timer: DeadlineHandle) {
        let mut record = self.records.entry(module.clone()).or_default();
        if let Some(previous) = record.pending_timer.replace(timer) {
            previous.cancel();
        }
    }

    /// Cancel and clear the pending deadline. No-op when none is armed or
    /// the timer already fired.
    pub(crate) fn disarm_deadline(&self, module: &ModuleId) {
        if let Some(mut record) = self.records.get_mut(module)
            && let Some(timer) = record.pending_timer.take()
        {
            timer.cancel();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
