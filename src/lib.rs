//! Reheat - hot-update orchestration for live component instances.
//!
//! When the host module runtime reports that a unit of code changed, reheat
//! safely re-renders every mounted component instance derived from that
//! module: without losing component identity, without racing concurrent
//! updates, and without silently failing.
//!
//! The engine coordinates *when* and *in what order* already-swapped
//! implementations reach live instances. What changed, how it was rebuilt,
//! and how the UI framework reconciles the new render are all host concerns,
//! reached through the traits in [`host`].
//!
//! ```text
//! host hook -> UpdateOrchestrator -> require queue (reload)
//!                                 -> render queue  (deep update)
//!                                 -> InstanceRegistry (force re-render)
//!                                 -> Generation (epoch bump, later polled)
//! ```
//!
//! Construct the orchestrator on the host's tokio runtime, hand each module
//! to [`wrap_module`], and export the returned [`HotExport`] in place of the
//! original component.

mod config;
mod engine;
mod host;
#[doc(hidden)]
pub mod logger;
mod proxy;

pub use config::{ConfigError, EngineConfig};
pub use engine::generation::Generation;
pub use engine::orchestrator::{UpdateError, UpdateOrchestrator};
pub use engine::queue::{ExecutorWrapper, TaskFuture, TaskHandle, TaskQueue};
pub use engine::registry::{InstanceId, InstanceRegistry, ProxyHandle};
pub use engine::timer::{DeadlineHandle, DeadlineTimer};
pub use host::{
    Component, ErrorBoundary, ExceptionSink, HostModule, HostStatus, HotHooks, Invalidate,
    ModuleId, ModuleLoader, UpdatePayload,
};
pub use proxy::{ExportWrapper, HotExport, ProxyInstance, WrapError, wrap_module};
