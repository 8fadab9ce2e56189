//! Proxy Instance Lifecycle
//!
//! The wrap entry point, the stable per-module export, and the per-mount
//! proxy. The export's identity never changes across reloads, so holders of
//! a reference to it remain valid; only the delegated implementation swaps.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use thiserror::Error;

use crate::engine::orchestrator::UpdateOrchestrator;
use crate::engine::registry::{InstanceId, InstanceRegistry, ProxyHandle};
use crate::host::{Component, ErrorBoundary, HostModule, Invalidate, ModuleId, ModuleLoader};

// =============================================================================
// Errors
// =============================================================================

/// Errors from `wrap_module`. These indicate a wiring mistake and are
/// surfaced to the caller immediately instead of logged and swallowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WrapError {
    #[error("module has no resolvable id")]
    MissingModuleId,
}

// =============================================================================
// Wrap entry point
// =============================================================================

/// Register `module` with the orchestrator and return the export-wrapping
/// function for its components.
///
/// Registers the change-notification and status callbacks on the module's
/// hot-update hooks when present; without them the wrapper still works as a
/// plain pass-through (a warning is logged once at registration). A deadline
/// is armed here and canceled by the first [`ExportWrapper::wrap`] call.
pub fn wrap_module(
    orchestrator: &Arc<UpdateOrchestrator>,
    module: &dyn HostModule,
    boundary: Arc<dyn ErrorBoundary>,
) -> Result<ExportWrapper, WrapError> {
    let id = module.id().ok_or(WrapError::MissingModuleId)?;

    orchestrator.begin_registration(&id);

    match module.hot() {
        Some(hooks) => {
            let orch = Arc::clone(orchestrator);
            let update_id = id.clone();
            hooks.on_update(Box::new(move |payload| {
                orch.update_instances(&update_id, payload);
            }));

            let orch = Arc::clone(orchestrator);
            let status_id = id.clone();
            hooks.on_status(Box::new(move |status| {
                orch.handle_status(&status_id, status);
            }));
        }
        None => {
            crate::log!(
                "proxy";
                "module {} has no hot-update support; its exports will not hot-update",
                id
            );
        }
    }

    Ok(ExportWrapper {
        orchestrator: Arc::clone(orchestrator),
        module: id,
        boundary,
    })
}

/// The export step for one registered module. Each call binds the freshly
/// evaluated component behind the module's stable export.
pub struct ExportWrapper {
    orchestrator: Arc<UpdateOrchestrator>,
    module: ModuleId,
    boundary: Arc<dyn ErrorBoundary>,
}

impl std::fmt::Debug for ExportWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportWrapper")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl ExportWrapper {
    /// Wrap `component` as the module's hot export, a drop-in replacement
    /// for the original. The first call confirms the registration; later
    /// calls (module re-executions) rebind the implementation behind the
    /// same export.
    pub fn wrap(&self, component: Arc<dyn Component>) -> Arc<HotExport> {
        self.orchestrator.confirm_registration(&self.module);
        self.orchestrator
            .bind_export(&self.module, component, &self.boundary)
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }
}

// =============================================================================
// Hot Export
// =============================================================================

/// Sized cell for the bound implementation (arc-swap holds thin pointers
/// only).
struct BoundImpl {
    component: Arc<dyn Component>,
}

/// The stable, hot-swappable export of one module's component.
pub struct HotExport {
    module: ModuleId,
    /// Latest bound implementation; swapped atomically on rebind.
    current: ArcSwap<BoundImpl>,
    boundary: Arc<dyn ErrorBoundary>,
    registry: Arc<InstanceRegistry>,
    loader: Arc<dyn ModuleLoader>,
}

impl HotExport {
    pub(crate) fn new(
        module: ModuleId,
        component: Arc<dyn Component>,
        boundary: Arc<dyn ErrorBoundary>,
        registry: Arc<InstanceRegistry>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            module,
            current: ArcSwap::from_pointee(BoundImpl { component }),
            boundary,
            registry,
            loader,
        }
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// Latest bound implementation.
    pub fn current(&self) -> Arc<dyn Component> {
        Arc::clone(&self.current.load().component)
    }

    pub(crate) fn rebind(&self, component: Arc<dyn Component>) {
        crate::debug!("proxy"; "rebinding {} to <{}>", self.module, component.name());
        self.current.store(Arc::new(BoundImpl { component }));
    }

    /// Mount one instance, registering it for forced re-renders. The UI
    /// framework supplies the per-instance re-render primitive.
    pub fn mount(self: &Arc<Self>, invalidate: Arc<dyn Invalidate>) -> ProxyInstance {
        let handle = self.registry.add(&self.module, invalidate);
        crate::debug!("proxy"; "mounted {} instance {:?}", self.module, handle.id());
        ProxyInstance {
            export: Arc::clone(self),
            handle,
        }
    }
}

// =============================================================================
// Proxy Instance
// =============================================================================

/// One mounted proxy. Renders always go through the error boundary,
/// forwarding the received external properties to the currently bound
/// implementation.
pub struct ProxyInstance {
    export: Arc<HotExport>,
    handle: ProxyHandle,
}

impl ProxyInstance {
    pub fn id(&self) -> InstanceId {
        self.handle.id()
    }

    pub fn module(&self) -> &ModuleId {
        self.export.module()
    }

    /// Render the current implementation through the error boundary.
    pub fn render(&self, props: &Value) -> Value {
        let current = self.export.current();
        self.export.boundary.render(current.as_ref(), props)
    }

    /// Unmount this instance. Removal from the registry happens regardless
    /// of the misuse check.
    pub fn unmount(self) {
        let module = self.export.module();
        if self.export.loader.is_open(module) {
            crate::log!(
                "proxy";
                "<{}> unmounted while module {} is still being processed; \
                 avoid mounting a hot-wrapped export in the file that defines it",
                self.export.current().name(),
                module
            );
        }
        self.export.registry.remove(module, &self.handle);
    }
}

// =============================================================================
// Tests
// =============================================================================
