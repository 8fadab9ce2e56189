//! Host collaborator interfaces.
//!
//! The engine only decides *when* and *in what order* updated
//! implementations are pushed to live instances. Loading modules, rendering,
//! error containment and reporting are all done by the host through these
//! seams.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

// =============================================================================
// Module identity
// =============================================================================

/// Identifier of a reloadable unit of code.
///
/// Invariants:
/// - Stable for the life of the dev session
/// - Cheap to clone (shared backing string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Get the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// =============================================================================
// Module-loading runtime
// =============================================================================

/// Operations consumed from the host's module-loading runtime.
pub trait ModuleLoader: Send + Sync {
    /// Re-invoke the loader for `id`. Idempotent when the host already
    /// re-executed the module for the current cycle.
    fn require(&self, id: &ModuleId) -> Result<()>;

    /// Whether `id` is currently open: being processed by an edit/reload
    /// cycle rather than settled.
    fn is_open(&self, id: &ModuleId) -> bool;
}

/// Change-notification payload: `Some` when the host reports an error for
/// the current update cycle.
pub type UpdatePayload = Option<anyhow::Error>;

/// Host update-cycle status, as delivered through the optional status
/// subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// No update cycle in progress.
    Idle,
    /// The host is applying an update cycle.
    Apply,
}

/// Hot-update hook surface of one host module.
pub trait HotHooks: Send + Sync {
    /// Register the change-notification callback. The host invokes it after
    /// re-executing the module, or with an error when re-execution failed.
    fn on_update(&self, callback: Box<dyn Fn(UpdatePayload) + Send + Sync>);

    /// Subscribe to the host's status sequence. Optional; hosts without a
    /// status stream ignore the callback.
    fn on_status(&self, _callback: Box<dyn Fn(HostStatus) + Send + Sync>) {}
}

/// The host module object handed to `wrap_module`.
///
/// `hot()` returning `None` means the runtime was started without
/// hot-update support; the wrapper then degrades to a plain pass-through.
pub trait HostModule: Send + Sync {
    /// Resolvable module id, if any.
    fn id(&self) -> Option<ModuleId>;

    /// Hot-update hook surface, if the runtime provides one.
    fn hot(&self) -> Option<Arc<dyn HotHooks>>;
}

// =============================================================================
// UI framework
// =============================================================================

/// Force re-render primitive for one mounted instance, provided by the UI
/// framework at mount time.
pub trait Invalidate: Send + Sync {
    fn force_render(&self);
}

/// One version of a component implementation bound to a module export.
pub trait Component: Send + Sync {
    /// Display name, derived by the host. Used only for diagnostics.
    fn name(&self) -> &str;

    /// Render with the given external properties.
    fn render(&self, props: &Value) -> Result<Value>;
}

/// Error-boundary wrapper the proxy always renders through. Must not fail:
/// inner render errors are converted into fallback output.
pub trait ErrorBoundary: Send + Sync {
    fn render(&self, inner: &dyn Component, props: &Value) -> Value;
}

// =============================================================================
// Reporting
// =============================================================================

/// Exception-report sink for non-fatal diagnostics.
pub trait ExceptionSink: Send + Sync {
    fn report(&self, error: &anyhow::Error);
}

// =============================================================================
// Tests
// =============================================================================
