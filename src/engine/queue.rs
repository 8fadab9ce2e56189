//! Task Queue
//!
//! Serializes asynchronous units of work: strict FIFO, run-to-completion,
//! at most one task in flight per queue. A failing task is logged and
//! isolated; it never stops the queue or the tasks enqueued after it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

/// Boxed unit of queue work.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Executor strategy applied to every task of a queue, e.g. the UI
/// framework's batched-update scope. Defaults to direct invocation.
pub type ExecutorWrapper = Arc<dyn Fn(TaskFuture) -> TaskFuture + Send + Sync>;

// =============================================================================
// Task Queue
// =============================================================================

/// A queue of deferred work with strict FIFO execution.
pub struct TaskQueue {
    label: &'static str,
    tx: mpsc::UnboundedSender<TaskFuture>,
}

impl TaskQueue {
    /// Create a queue that invokes tasks directly.
    ///
    /// Must be called from within a tokio runtime: the worker loop is
    /// spawned here.
    pub fn new(label: &'static str) -> Self {
        Self::with_wrapper(label, Arc::new(|work| work))
    }

    /// Create a queue whose tasks each run through `wrapper`.
    pub fn with_wrapper(label: &'static str, wrapper: ExecutorWrapper) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TaskFuture>();

        // The worker awaits each task to completion before receiving the
        // next one: the loop itself is the in-flight flag.
        tokio::spawn(async move {
            while let Some(work) = rx.recv().await {
                wrapper(work).await;
            }
            crate::debug!("queue"; "{}: closed", label);
        });

        Self { label, tx }
    }

    /// Append `work` to the pending sequence. The returned handle resolves
    /// once the work has run to completion, success or failure. Failures
    /// are logged here and do not propagate to later tasks.
    pub fn enqueue<T, F>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let label = self.label;

        let task: TaskFuture = Box::pin(async move {
            let outcome = work.await;
            if let Err(e) = &outcome {
                crate::log!("queue"; "{}: task failed: {:#}", label, e);
            }
            // The enqueuer may have dropped its handle; the task still
            // counts as settled.
            let _ = done_tx.send(outcome);
        });

        if self.tx.send(task).is_err() {
            crate::debug!("queue"; "{}: enqueue after close", self.label);
        }

        TaskHandle { rx: done_rx }
    }
}

// =============================================================================
// Task Handle
// =============================================================================

/// Completion signal for one enqueued task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait until the task has settled. Returns `None` if the queue was
    /// torn down before the task ran.
    pub async fn settled(self) -> Option<Result<T>> {
        self.rx.await.ok()
    }
}

// =============================================================================
// Tests
// =============================================================================
