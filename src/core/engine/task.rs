// src/core/engine/task.rs

//! Handles for scheduled probe invocations, whichever way they were run.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::core::error::{ProbeFailure, ProbeResult};
use crate::core::findings::RawResult;
use crate::core::models::Asset;
use crate::core::options::CheckKind;

pub type ProbeOutcome = ProbeResult<Vec<RawResult>>;

/// A running probe. Pooled tasks hand their outcome back to whoever polls the
/// handle; background tasks merge their own outcome before they exit.
#[derive(Debug)]
pub enum TaskHandle {
    Pooled(JoinHandle<ProbeOutcome>),
    Background(JoinHandle<()>),
}

/// What a finished handle yields when it is collected.
#[derive(Debug)]
pub enum Collected {
    /// A pooled outcome still to be merged.
    Outcome(ProbeOutcome),
    /// A background task; its result is already in the store.
    Merged,
}

impl TaskHandle {
    pub fn is_done(&self) -> bool {
        match self {
            TaskHandle::Pooled(handle) => handle.is_finished(),
            TaskHandle::Background(handle) => handle.is_finished(),
        }
    }

    pub fn is_background(&self) -> bool {
        matches!(self, TaskHandle::Background(_))
    }

    pub fn abort(&self) {
        match self {
            TaskHandle::Pooled(handle) => handle.abort(),
            TaskHandle::Background(handle) => handle.abort(),
        }
    }

    /// Collects a finished task without waiting.
    ///
    /// # Arguments
    ///
    /// * `task` - The invocation this handle runs, used to label failures.
    ///
    /// # Returns
    ///
    /// The outcome to merge, `Collected::Merged` for a background task that
    /// merged itself, or the handle back when the task has not completed yet.
    /// A task that panicked yields a failure either way.
    pub fn try_collect(mut self, task: &PendingTask) -> Result<Collected, Self> {
        let collected = match &mut self {
            TaskHandle::Pooled(handle) => handle.now_or_never().map(|joined| {
                Collected::Outcome(joined.unwrap_or_else(|e| Err(join_failure(task, &e))))
            }),
            TaskHandle::Background(handle) => handle.now_or_never().map(|joined| match joined {
                Ok(()) => Collected::Merged,
                Err(e) => {
                    warn!(asset = %task.asset.value, check = %task.check, error = %e, "background probe task died");
                    Collected::Outcome(Err(join_failure(task, &e)))
                }
            }),
        };
        collected.ok_or(self)
    }

    /// Waits for the task to exit, whatever its outcome.
    pub async fn join(self) {
        let result = match self {
            TaskHandle::Pooled(handle) => handle.await.map(|_| ()),
            TaskHandle::Background(handle) => handle.await,
        };
        if let Err(e) = result {
            if !e.is_cancelled() {
                warn!(error = %e, "probe task panicked");
            }
        }
    }
}

fn join_failure(task: &PendingTask, error: &tokio::task::JoinError) -> ProbeFailure {
    let reason = if error.is_cancelled() { "task cancelled".to_string() } else { format!("task panicked: {error}") };
    ProbeFailure::new(task.check.to_string(), task.asset.value.clone(), reason)
}

/// One `(asset, check)` invocation owned by a scan until it is collected.
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub asset: Asset,
    pub check: CheckKind,
}

/// Fixed-size pool for pooled probes: every submission runs as its own task
/// but waits for one of `size` permits before invoking the probe.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

/// The pool has been closed and accepts no new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(size)), size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Probes currently holding a permit.
    pub fn busy(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Queued submissions that have not started yet fail once the pool closes.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Spawns `work` behind a pool permit without waiting for one.
    ///
    /// # Arguments
    /// * `task` - The invocation, used to label a failure if the pool closes first.
    /// * `work` - The probe call.
    ///
    /// # Returns
    /// A pooled handle, or `PoolClosed` once [`WorkerPool::close`] was called.
    pub fn submit<F>(&self, task: &PendingTask, work: F) -> Result<TaskHandle, PoolClosed>
    where
        F: Future<Output = ProbeOutcome> + Send + 'static,
    {
        if self.permits.is_closed() {
            return Err(PoolClosed);
        }
        let permits = self.permits.clone();
        let (check, asset) = (task.check.to_string(), task.asset.value.clone());
        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Err(ProbeFailure::new(check, asset, "worker pool closed"));
            };
            work.await
        });
        Ok(TaskHandle::Pooled(handle))
    }
}
