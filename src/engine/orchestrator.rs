//! Update Orchestrator
//!
//! Composes the queue pair, the instance registry, the generation tracker
//! and the deadline timer into the reload→render→reconcile protocol. Per
//! module registration this is a small state machine:
//!
//! ```text
//! Registered --> fired      (export step never ran, diagnostic reported)
//!            \-> confirmed  (export step ran, deadline canceled)
//! ```
//!
//! Update triggers flow through two process-wide queues: the require queue
//! for defensive re-loads, and the render queue for deep updates. The render
//! task for a trigger is only enqueued once its paired reload has settled,
//! so reload and render form a causal pair per trigger while independent
//! triggers interleave at task granularity.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::engine::generation::Generation;
use crate::engine::queue::{ExecutorWrapper, TaskHandle, TaskQueue};
use crate::engine::registry::InstanceRegistry;
use crate::engine::timer::DeadlineTimer;
use crate::host::{
    Component, ErrorBoundary, ExceptionSink, HostStatus, ModuleId, ModuleLoader, UpdatePayload,
};
use crate::proxy::HotExport;

// =============================================================================
// Errors
// =============================================================================

/// Diagnostics surfaced by the update protocol.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The export step never ran within the deadline window. Usually an
    /// exception during module evaluation swallowed the export step.
    #[error(
        "module `{module}` was registered but its export step never ran \
         (last module in flight: {last_in_flight})"
    )]
    RegistrationNotConfirmed {
        module: ModuleId,
        last_in_flight: String,
    },
}

// =============================================================================
// Update Orchestrator
// =============================================================================

/// Coordinates when already-swapped implementations reach live instances.
pub struct UpdateOrchestrator {
    config: EngineConfig,
    registry: Arc<InstanceRegistry>,
    generation: Arc<Generation>,
    require_queue: TaskQueue,
    render_queue: TaskQueue,
    loader: Arc<dyn ModuleLoader>,
    exceptions: Arc<dyn ExceptionSink>,
    /// Runtime captured at construction so host callbacks may arrive from
    /// non-runtime threads.
    rt: tokio::runtime::Handle,
    /// The module the host touched last (deadline diagnostics).
    in_flight: Mutex<Option<ModuleId>>,
    /// Error payload remembered from the last failed update notification.
    pending_error: Mutex<Option<String>>,
    /// Last observed host status per module, for Apply edge detection.
    statuses: Mutex<FxHashMap<ModuleId, HostStatus>>,
    /// Stable exports keyed by module id (process-wide cache).
    exports: Mutex<FxHashMap<ModuleId, Arc<HotExport>>>,
}

impl UpdateOrchestrator {
    /// Create the orchestrator. Registry and generation are passed in so
    /// tests can construct fresh state per case.
    ///
    /// Must be called from within the host's tokio runtime: the queue
    /// workers are spawned here and the runtime handle is captured for
    /// later host callbacks.
    pub fn new(
        config: EngineConfig,
        registry: Arc<InstanceRegistry>,
        generation: Arc<Generation>,
        loader: Arc<dyn ModuleLoader>,
        exceptions: Arc<dyn ExceptionSink>,
    ) -> Self {
        Self {
            config,
            registry,
            generation,
            require_queue: TaskQueue::new("require"),
            render_queue: TaskQueue::new("render"),
            loader,
            exceptions,
            rt: tokio::runtime::Handle::current(),
            in_flight: Mutex::new(None),
            pending_error: Mutex::new(None),
            statuses: Mutex::new(FxHashMap::default()),
            exports: Mutex::new(FxHashMap::default()),
        }
    }

    /// Run every render-queue task through `batch`, e.g. the UI framework's
    /// batched-update scope, so renders triggered in the same tick coalesce.
    pub fn with_render_batch(mut self, batch: ExecutorWrapper) -> Self {
        self.render_queue = TaskQueue::with_wrapper("render", batch);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    pub fn generation(&self) -> &Arc<Generation> {
        &self.generation
    }

    /// Whether an update-cycle error is currently remembered.
    pub fn has_pending_error(&self) -> bool {
        self.pending_error.lock().is_some()
    }

    // -------------------------------------------------------------------------
    // Registration deadline
    // -------------------------------------------------------------------------

    /// Called when the host begins evaluating `module`'s wrapping step. Arms
    /// the registration deadline; `confirm_registration` cancels it.
    pub fn begin_registration(self: &Arc<Self>, module: &ModuleId) {
        self.in_flight.lock().replace(module.clone());

        let this = Arc::clone(self);
        let id = module.clone();
        let _rt = self.rt.enter();
        let timer = DeadlineTimer::start(self.config.deadline(), move || {
            this.registration_deadline_fired(&id);
        });
        self.registry.arm_deadline(module, timer);
    }

    /// Confirmation that `module`'s wrapping/export step actually executed.
    /// This confirms registration completed, not that a later code change
    /// was applied. Later calls are no-ops.
    pub fn confirm_registration(&self, module: &ModuleId) {
        self.registry.disarm_deadline(module);
    }

    fn registration_deadline_fired(&self, module: &ModuleId) {
        let last_in_flight = self
            .in_flight
            .lock()
            .clone()
            .map_or_else(|| "<none>".to_string(), |m| m.to_string());

        let error = anyhow::Error::new(UpdateError::RegistrationNotConfirmed {
            module: module.clone(),
            last_in_flight,
        });
        crate::log!("error"; "{:#}", error);
        self.exceptions.report(&error);
    }

    // -------------------------------------------------------------------------
    // Update protocol
    // -------------------------------------------------------------------------

    /// Change-notification entry point. `payload` carries the host's error
    /// for the cycle, if any.
    pub fn update_instances(self: &Arc<Self>, module: &ModuleId, payload: UpdatePayload) {
        if let Some(error) = payload {
            // Abort before any instance is touched: the previous render
            // stands and the generation counter is left alone.
            crate::log!("update"; "host reported an error for {}: {:#}", module, error);
            *self.pending_error.lock() = Some(format!("{error:#}"));
            return;
        }

        let loader = Arc::clone(&self.loader);
        let id = module.clone();
        let reload = self.require_queue.enqueue(async move {
            // Defensive re-require: idempotent when the host already
            // re-executed the module. Failures must not block the paired
            // render task.
            if let Err(e) = loader.require(&id) {
                crate::log!("update"; "re-require of {} failed: {:#}", id, e);
            }
            Ok(())
        });

        let this = Arc::clone(self);
        let id = module.clone();
        let _rt = self.rt.enter();
        tokio::spawn(async move {
            // The render task is enqueued only once its paired reload has
            // settled, success or failure.
            let _ = reload.settled().await;
            this.deep_update_with_tail(&id).await;
        });
    }

    /// Host status-sequence callback. On a transition *into* `Apply`, clear
    /// pending exception state and run the normal update path.
    pub fn handle_status(self: &Arc<Self>, module: &ModuleId, status: HostStatus) {
        let previous = self.statuses.lock().insert(module.clone(), status);
        if status == HostStatus::Apply && previous != Some(HostStatus::Apply) {
            self.pending_error.lock().take();
            self.update_instances(module, None);
        }
    }

    async fn deep_update_with_tail(self: &Arc<Self>, module: &ModuleId) {
        let Some(Ok(mut epoch)) = self.enqueue_deep_update(module).settled().await else {
            return;
        };

        if !self.config.track_tail_updates {
            return;
        }

        // Bounded reconciliation poll. The carried attempt count makes the
        // termination bound structural: a mismatch re-runs the deep update
        // but never extends the poll.
        for _attempt in 0..self.config.tail_poll_attempts {
            tokio::time::sleep(self.config.tail_poll_interval()).await;
            if self.generation.current() != epoch {
                crate::log!(
                    "update";
                    "epoch advanced during {}'s render window; re-running deep update",
                    module
                );
                match self.enqueue_deep_update(module).settled().await {
                    Some(Ok(next)) => epoch = next,
                    _ => return,
                }
            }
        }
    }

    /// Enqueue one deep update: bump the epoch, capture it, force-re-render
    /// every instance currently registered for `module`.
    fn enqueue_deep_update(&self, module: &ModuleId) -> TaskHandle<u64> {
        let registry = Arc::clone(&self.registry);
        let generation = Arc::clone(&self.generation);
        let id = module.clone();
        self.render_queue.enqueue(async move {
            generation.enter();
            let epoch = generation.current();
            let instances = registry.instances(&id);
            crate::debug!("update"; "deep update of {}: {} instance(s) at epoch {}", id, instances.len(), epoch);
            for handle in &instances {
                handle.force_render();
            }
            Ok(epoch)
        })
    }

    // -------------------------------------------------------------------------
    // Export binding
    // -------------------------------------------------------------------------

    /// Get-or-create the stable export for `module` and rebind its
    /// implementation. The export instance survives re-executions; only the
    /// delegated implementation changes.
    pub(crate) fn bind_export(
        &self,
        module: &ModuleId,
        component: Arc<dyn Component>,
        boundary: &Arc<dyn ErrorBoundary>,
    ) -> Arc<HotExport> {
        let mut exports = self.exports.lock();
        match exports.get(module) {
            Some(export) => {
                export.rebind(component);
                Arc::clone(export)
            }
            None => {
                let export = Arc::new(HotExport::new(
                    module.clone(),
                    component,
                    Arc::clone(boundary),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.loader),
                ));
                exports.insert(module.clone(), Arc::clone(&export));
                export
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::host::Invalidate;

    // ------------------------------------------------------------------------
    // Mocks
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct MockLoader {
        requires: AtomicUsize,
        fail: AtomicBool,
        open: AtomicBool,
    }

    impl ModuleLoader for MockLoader {
        fn require(&self, _id: &ModuleId) -> anyhow::Result<()> {
            self.requires.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                bail!("loader blew up");
            }
            Ok(())
        }

        fn is_open(&self, _id: &ModuleId) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct MockSink {
        reports: Mutex<Vec<String>>,
    }

    impl ExceptionSink for MockSink {
        fn report(&self, error: &anyhow::Error) {
            self.reports.lock().push(format!("{error:#}"));
        }
    }

    #[derive(Default)]
    struct CountingInstance {
        renders: AtomicUsize,
    }

    impl CountingInstance {
        fn count(&self) -> usize {
            self.renders.load(Ordering::SeqCst)
        }
    }

    impl Invalidate for CountingInstance {
        fn force_render(&self) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn build(
        config: EngineConfig,
        loader: &Arc<MockLoader>,
        sink: &Arc<MockSink>,
    ) -> Arc<UpdateOrchestrator> {
        Arc::new(UpdateOrchestrator::new(
            config,
            Arc::new(InstanceRegistry::new()),
            Arc::new(Generation::new()),
            Arc::clone(loader) as Arc<dyn ModuleLoader>,
            Arc::clone(sink) as Arc<dyn ExceptionSink>,
        ))
    }

    fn no_tail_config() -> EngineConfig {
        EngineConfig {
            track_tail_updates: false,
            ..EngineConfig::default()
        }
    }

    async fn wait_until(limit_ms: u64, cond: impl Fn() -> bool) -> bool {
        let rounds = (limit_ms / 5).max(1);
        for _ in 0..rounds {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    // ------------------------------------------------------------------------
    // Protocol tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_error_payload_aborts_cycle() {
        let loader = Arc::new(MockLoader::default());
        let sink = Arc::new(MockSink::default());
        let orch = build(no_tail_config(), &loader, &sink);

        let module = ModuleId::from("app/a");
        let instance = Arc::new(CountingInstance::default());
        orch.registry().add(&module, Arc::clone(&instance) as Arc<dyn Invalidate>);

        orch.update_instances(&module, Some(anyhow::anyhow!("syntax error")));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(instance.count(), 0);
        assert_eq!(loader.requires.load(Ordering::SeqCst), 0);
        assert_eq!(orch.generation().current(), 0);
        assert!(orch.has_pending_error());
    }

    #[tokio::test]
    async fn test_cycle_renders_each_instance_exactly_once() {
        let loader = Arc::new(MockLoader::default());
        let sink = Arc::new(MockSink::default());
        let orch = build(no_tail_config(), &loader, &sink);

        let module = ModuleId::from("app/a");
        let first = Arc::new(CountingInstance::default());
        let second = Arc::new(CountingInstance::default());
        orch.registry().add(&module, Arc::clone(&first) as Arc<dyn Invalidate>);
        orch.registry().add(&module, Arc::clone(&second) as Arc<dyn Invalidate>);

        let before = orch.generation().current();
        orch.update_instances(&module, None);

        assert!(wait_until(500, || first.count() == 1 && second.count() == 1).await);
        assert_eq!(orch.generation().current(), before + 1);
        assert_eq!(loader.requires.load(Ordering::SeqCst), 1);

        // No extra renders arrive after the cycle completes
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
    }

    #[tokio::test]
    async fn test_reload_failure_does_not_block_render() {
        let loader = Arc::new(MockLoader::default());
        loader.fail.store(true, Ordering::SeqCst);
        let sink = Arc::new(MockSink::default());
        let orch = build(no_tail_config(), &loader, &sink);

        let module = ModuleId::from("app/a");
        let instance = Arc::new(CountingInstance::default());
        orch.registry().add(&module, Arc::clone(&instance) as Arc<dyn Invalidate>);

        orch.update_instances(&module, None);

        assert!(wait_until(500, || instance.count() == 1).await);
        assert_eq!(loader.requires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_reports_unconfirmed_registration() {
        let loader = Arc::new(MockLoader::default());
        let sink = Arc::new(MockSink::default());
        let config = EngineConfig {
            deadline_ms: 20,
            ..no_tail_config()
        };
        let orch = build(config, &loader, &sink);

        orch.begin_registration(&ModuleId::from("app/b"));
        tokio::time::sleep(Duration::from_millis(120)).await;

        let reports = sink.reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("app/b"));
    }

    #[tokio::test]
    async fn test_confirm_cancels_deadline() {
        let loader = Arc::new(MockLoader::default());
        let sink = Arc::new(MockSink::default());
        let config = EngineConfig {
            deadline_ms: 20,
            ..no_tail_config()
        };
        let orch = build(config, &loader, &sink);

        let module = ModuleId::from("app/b");
        orch.begin_registration(&module);
        orch.confirm_registration(&module);
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(sink.reports.lock().is_empty());
    }

    #[tokio::test]
    async fn test_tail_update_rerenders_on_epoch_mismatch() {
        let loader = Arc::new(MockLoader::default());
        let sink = Arc::new(MockSink::default());
        let config = EngineConfig {
            track_tail_updates: true,
            tail_poll_ms: 25,
            tail_poll_attempts: 5,
            ..EngineConfig::default()
        };
        let orch = build(config, &loader, &sink);

        let module = ModuleId::from("app/a");
        let instance = Arc::new(CountingInstance::default());
        orch.registry().add(&module, Arc::clone(&instance) as Arc<dyn Invalidate>);

        orch.update_instances(&module, None);
        assert!(wait_until(500, || instance.count() == 1).await);

        // Simulate an independent cycle advancing the epoch inside the
        // poll window: the first cycle must re-render exactly once more.
        orch.generation().enter();
        assert!(wait_until(500, || instance.count() == 2).await);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(instance.count(), 2);
    }

    #[tokio::test]
    async fn test_tail_update_poll_is_bounded() {
        let loader = Arc::new(MockLoader::default());
        let sink = Arc::new(MockSink::default());
        let config = EngineConfig {
            track_tail_updates: true,
            tail_poll_ms: 15,
            tail_poll_attempts: 5,
            ..EngineConfig::default()
        };
        let orch = build(config, &loader, &sink);

        let module = ModuleId::from("app/a");
        let instance = Arc::new(CountingInstance::default());
        orch.registry().add(&module, Arc::clone(&instance) as Arc<dyn Invalidate>);

        orch.update_instances(&module, None);
        assert!(wait_until(500, || instance.count() >= 1).await);

        // Keep the epoch moving for longer than the whole poll window
        for _ in 0..40 {
            orch.generation().enter();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Initial render plus at most one re-run per poll attempt
        assert!(instance.count() >= 2);
        assert!(instance.count() <= 6, "count was {}", instance.count());
    }

    #[tokio::test]
    async fn test_status_apply_transition_triggers_cycle() {
        let loader = Arc::new(MockLoader::default());
        let sink = Arc::new(MockSink::default());
        let orch = build(no_tail_config(), &loader, &sink);

        let module = ModuleId::from("app/a");
        let instance = Arc::new(CountingInstance::default());
        orch.registry().add(&module, Arc::clone(&instance) as Arc<dyn Invalidate>);

        orch.handle_status(&module, HostStatus::Idle);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(instance.count(), 0);

        // A failed notification leaves pending exception state behind...
        orch.update_instances(&module, Some(anyhow::anyhow!("stale failure")));
        assert!(orch.has_pending_error());

        // ...which entering apply clears before running the cycle
        orch.handle_status(&module, HostStatus::Apply);
        assert!(wait_until(500, || instance.count() == 1).await);
        assert!(!orch.has_pending_error());

        // Repeated apply reports are not a transition
        orch.handle_status(&module, HostStatus::Apply);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(instance.count(), 1);

        // A fresh idle->apply edge runs another cycle
        orch.handle_status(&module, HostStatus::Idle);
        orch.handle_status(&module, HostStatus::Apply);
        assert!(wait_until(500, || instance.count() == 2).await);
    }
}
