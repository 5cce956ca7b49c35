//! Exclusive Executor
//!
//! Serializes operations against the single instance held by a [`LazyResource`].
//! Each submitted operation gets a detached driver that waits for the
//! resource and the exclusive lock (both waits race against cancellation) and then
//! runs the work on a dedicated worker thread so that cancellation can be observed
//! while the resource is busy.

use crate::error::{EvalError, OperationError};
use crate::resource::lazy::LazyResource;
use crate::resource::operation::{
    Interruptible, OperationHandle, OperationShared, OperationStatus, Outcome,
};
use crate::resource::panic_message;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::{self, Handle};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, warn};

/// Executor statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Number of operations submitted
    pub submitted: usize,
    /// Number of operations that completed normally
    pub completed: usize,
    /// Number of operations that were cancelled
    pub cancelled: usize,
    /// Number of operations that failed
    pub failed: usize,
}

impl ExecutorStats {
    /// Operations not yet in a terminal state
    pub fn in_flight(&self) -> usize {
        self.submitted
            .saturating_sub(self.completed + self.cancelled + self.failed)
    }

    fn record(&mut self, status: OperationStatus) {
        match status {
            OperationStatus::Completed => self.completed += 1,
            OperationStatus::Cancelled => self.cancelled += 1,
            OperationStatus::Failed => self.failed += 1,
            OperationStatus::Pending | OperationStatus::Running => {}
        }
    }
}

/// Runs operations one at a time against a lazily constructed resource
pub struct ExclusiveExecutor<R> {
    resource: LazyResource<R>,
    /// Exclusive access token; FIFO, so waiters are served in arrival order
    lock: Arc<Mutex<()>>,
    stats: Arc<RwLock<ExecutorStats>>,
}

impl<R> Clone for ExclusiveExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            lock: Arc::clone(&self.lock),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<R> fmt::Debug for ExclusiveExecutor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveExecutor")
            .field("resource", &self.resource)
            .field("stats", &*self.stats.read())
            .finish()
    }
}

impl<R: Interruptible + 'static> ExclusiveExecutor<R> {
    pub fn new(resource: LazyResource<R>) -> Self {
        Self {
            resource,
            lock: Arc::new(Mutex::new(())),
            stats: Arc::new(RwLock::new(ExecutorStats::default())),
        }
    }

    pub fn resource(&self) -> &LazyResource<R> {
        &self.resource
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.read().clone()
    }

    /// Submit an operation (returns immediately).
    pub fn submit<T, F>(&self, label: impl Into<String>, operation: F) -> OperationHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&R) -> Result<T, EvalError> + Send + 'static,
    {
        self.submit_with_deadline(label, None, operation)
    }

    /// Submit an operation that is cancelled once `deadline` has passed since
    /// submission, wherever it is at that point (waiting or running).
    ///
    /// Inside a Tokio runtime the driver is a task on that runtime. Anywhere else it
    /// gets its own detached thread, so callers need no runtime of their own.
    pub fn submit_with_deadline<T, F>(
        &self,
        label: impl Into<String>,
        deadline: Option<Duration>,
        operation: F,
    ) -> OperationHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&R) -> Result<T, EvalError> + Send + 'static,
    {
        let shared = OperationShared::new(label.into());
        let handle = OperationHandle::new(Arc::clone(&shared));

        self.stats.write().submitted += 1;
        debug!(
            operation_id = %shared.id(),
            label = %shared.label(),
            resource = %self.resource.name(),
            deadline_ms = deadline.map(|d| d.as_millis() as u64),
            "Submitted operation"
        );

        let resource = self.resource.clone();
        let lock = Arc::clone(&self.lock);
        let stats = Arc::clone(&self.stats);
        let driven = Arc::clone(&shared);
        let driver = async move {
            let work = Self::drive(resource, lock, Arc::clone(&driven), operation);
            match deadline {
                Some(limit) => {
                    tokio::pin!(work);
                    tokio::select! {
                        _ = &mut work => {}
                        _ = tokio::time::sleep(limit) => {
                            if !driven.status().is_terminal() {
                                warn!(
                                    operation_id = %driven.id(),
                                    label = %driven.label(),
                                    deadline_ms = limit.as_millis() as u64,
                                    "Operation exceeded its deadline, cancelling"
                                );
                                driven.request_cancel();
                            }
                            work.await;
                        }
                    }
                }
                None => work.await,
            }
            let status = driven.status();
            stats.write().record(status);
            debug!(operation_id = %driven.id(), status = ?status, "Operation finished");
        };

        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn(driver);
            return handle;
        }

        let orphan = Arc::clone(&shared);
        let orphan_stats = Arc::clone(&self.stats);
        let spawned = thread::Builder::new()
            .name(format!("Operation driver: {}", shared.label()))
            .spawn(move || {
                match runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime.block_on(driver),
                    Err(err) => Self::abandon(
                        &orphan,
                        &orphan_stats,
                        format!("cannot start driver runtime: {}", err),
                    ),
                }
            });
        if let Err(err) = spawned {
            Self::abandon(&shared, &self.stats, format!("cannot start driver thread: {}", err));
        }

        handle
    }

    /// Fail an operation whose driver could not be started.
    fn abandon<T>(shared: &OperationShared<T>, stats: &RwLock<ExecutorStats>, message: String)
    where
        T: Clone + Send + Sync + 'static,
    {
        error!(
            operation_id = %shared.id(),
            label = %shared.label(),
            error = %message,
            "Operation driver unavailable"
        );
        shared.settle(Outcome::Failed(OperationError::OperationFailed(
            EvalError::Runtime(message),
        )));
        stats.write().record(shared.status());
    }

    /// Driver for one operation: resource, then lock, then work.
    async fn drive<T, F>(
        resource: LazyResource<R>,
        lock: Arc<Mutex<()>>,
        shared: Arc<OperationShared<T>>,
        operation: F,
    ) where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&R) -> Result<T, EvalError> + Send + 'static,
    {
        let token = shared.token().clone();

        let instance = tokio::select! {
            biased;
            _ = token.cancelled() => {
                shared.settle(Outcome::Cancelled);
                return;
            }
            ready = resource.get(None) => match ready {
                Ok(instance) => instance,
                Err(err) => {
                    let err = OperationError::from(err);
                    warn!(operation_id = %shared.id(), label = %shared.label(), error = %err, "Resource unavailable");
                    shared.settle(Outcome::Failed(err));
                    return;
                }
            },
        };

        let _guard = tokio::select! {
            biased;
            _ = token.cancelled() => {
                shared.settle(Outcome::Cancelled);
                return;
            }
            guard = Arc::clone(&lock).lock_owned() => guard,
        };

        let holder: Arc<dyn Interruptible> = instance.clone();
        if !shared.begin(holder) {
            // Cancelled between lock acquisition and start
            shared.settle(Outcome::Cancelled);
            return;
        }
        let started = Instant::now();
        debug!(operation_id = %shared.id(), label = %shared.label(), "Operation acquired exclusive access");

        let (done_tx, mut done_rx) = oneshot::channel();
        let worker = thread::Builder::new()
            .name(format!("Evaluation worker: {}", shared.label()))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(move || operation(&instance)))
                    .unwrap_or_else(|payload| {
                        Err(EvalError::Runtime(format!(
                            "operation panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    });
                let _ = done_tx.send(result);
            });

        if let Err(err) = worker {
            shared.end();
            shared.settle(Outcome::Failed(OperationError::OperationFailed(EvalError::Runtime(
                format!("cannot start worker thread: {}", err),
            ))));
            return;
        }

        let finished = tokio::select! {
            biased;
            result = &mut done_rx => Some(result),
            _ = token.cancelled() => None,
        };

        match finished {
            Some(result) => {
                shared.end();
                let outcome = match result {
                    Ok(Ok(value)) => Outcome::Completed(value),
                    Ok(Err(err)) => Outcome::Failed(OperationError::OperationFailed(err)),
                    Err(_) => Outcome::Failed(OperationError::OperationFailed(EvalError::Runtime(
                        "worker exited without a result".to_string(),
                    ))),
                };
                shared.settle(outcome);
                debug!(
                    operation_id = %shared.id(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Operation released exclusive access"
                );
            }
            None => {
                // The canceller has already interrupted the resource and released its
                // waiters. The lock stays held until the abandoned work stops.
                shared.settle(Outcome::Cancelled);
                debug!(operation_id = %shared.id(), "Waiting for cancelled operation to stop");
                let _ = done_rx.await;
                shared.end();
                debug!(
                    operation_id = %shared.id(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Cancelled operation stopped, releasing exclusive access"
                );
            }
        }
    }
}
