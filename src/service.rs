//! Ingestion of commands as independent tasks.
//!
//! Each inbound command runs as its own task on the manager's runtime, so a
//! long backup on one server never holds up a status request or a command for
//! another server. The tracker keeps the handles so shutdown can wait for
//! in-flight work and abort whatever outlives the grace period.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinSet;

/// Summary of a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks that finished within the grace period
    pub completed: usize,
    /// Tasks aborted after the grace period expired
    pub aborted: usize,
}

struct TrackerInner {
    accepting: AtomicBool,
    tasks: Mutex<JoinSet<()>>,
    runtime: Handle,
}

/// Spawns and tracks in-flight operations.
///
/// Cloning is cheap; every clone shares the same task set.
#[derive(Clone)]
pub struct OperationTracker {
    inner: Arc<TrackerInner>,
}

impl OperationTracker {
    /// Creates a tracker that spawns onto the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    /// Creates a tracker that spawns onto `runtime`.
    ///
    /// Tasks submitted from a different runtime (an HTTP worker, say) still
    /// run on `runtime`, so they outlive the submitting worker.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                accepting: AtomicBool::new(true),
                tasks: Mutex::new(JoinSet::new()),
                runtime,
            }),
        }
    }

    /// Whether new work is still accepted.
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Spawns `operation` and returns a receiver for its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] once [`close`](Self::close) has been called.
    pub async fn spawn<F>(&self, operation: F) -> Result<oneshot::Receiver<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_accepting() {
            return Err(Error::Other("The manager is shutting down".to_string()));
        }

        let mut tasks = self.inner.tasks.lock().await;
        // Re-check under the lock so nothing slips in behind a drain.
        if !self.is_accepting() {
            return Err(Error::Other("The manager is shutting down".to_string()));
        }
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::warn!(error = %e, "Operation task ended abnormally");
            }
        }

        let (tx, rx) = oneshot::channel();
        tasks.spawn_on(
            async move {
                let output = operation.await;
                let _ = tx.send(output);
            },
            &self.inner.runtime,
        );
        tracing::trace!(in_flight = tasks.len(), "Operation spawned");
        Ok(rx)
    }

    /// Stops accepting new work.
    pub fn close(&self) {
        if self.inner.accepting.swap(false, Ordering::SeqCst) {
            tracing::info!("Operation intake closed");
        }
    }

    /// Number of tasks not yet reaped.
    pub async fn in_flight(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }

    /// Closes intake, waits up to `grace` for in-flight tasks, then aborts the rest.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        self.close();
        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        let mut report = DrainReport::default();
        if tasks.is_empty() {
            return report;
        }

        tracing::info!(in_flight = tasks.len(), grace_secs = grace.as_secs(), "Draining operations");
        let waited = tokio::time::timeout(grace, async {
            while let Some(finished) = tasks.join_next().await {
                if let Err(e) = finished {
                    tracing::warn!(error = %e, "Operation task ended abnormally");
                }
                report.completed += 1;
            }
        })
        .await;

        if waited.is_err() {
            report.aborted = tasks.len();
            tracing::warn!(aborted = report.aborted, "Grace period expired; aborting operations");
            tasks.shutdown().await;
        }
        report
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}
