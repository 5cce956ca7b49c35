//! Cancelable Operations
//!
//! One operation is one unit of work against the shared resource. Its handle can be
//! awaited with an optional bound and cancelled at any point. Cancellation of a
//! running operation interrupts the resource before `cancel` returns.

use crate::error::OperationError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A resource that can be asked to abort its current call.
pub trait Interruptible: Send + Sync {
    /// Cooperative abort signal. Must be idempotent and safe to call when idle.
    fn interrupt(&self);

    /// Reset a pending interrupt before the next operation starts.
    fn clear_interrupt(&self) {}
}

/// Operation ID for tracking and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    /// Generate the next operation ID
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        OperationId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Lifecycle of an operation. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Cancelled | OperationStatus::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Outcome<T> {
    Pending,
    Running,
    Completed(T),
    Cancelled,
    Failed(OperationError),
}

impl<T> Outcome<T> {
    fn status(&self) -> OperationStatus {
        match self {
            Outcome::Pending => OperationStatus::Pending,
            Outcome::Running => OperationStatus::Running,
            Outcome::Completed(_) => OperationStatus::Completed,
            Outcome::Cancelled => OperationStatus::Cancelled,
            Outcome::Failed(_) => OperationStatus::Failed,
        }
    }

    fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Cancellation flag and the resource currently executing this operation.
///
/// Both live under one lock: a cancel that sees a holder interrupts it before the
/// holder can be cleared, and a holder is never installed after a cancel.
#[derive(Default)]
struct Control {
    cancel_requested: bool,
    holder: Option<Arc<dyn Interruptible>>,
}

/// State shared between the handle, its cancel handles, and the executor driver
pub(crate) struct OperationShared<T> {
    id: OperationId,
    label: String,
    control: Mutex<Control>,
    token: CancellationToken,
    outcome: watch::Sender<Outcome<T>>,
}

impl<T: Clone + Send + Sync + 'static> OperationShared<T> {
    pub(crate) fn new(label: String) -> Arc<Self> {
        let (outcome, _) = watch::channel(Outcome::Pending);
        Arc::new(Self {
            id: OperationId::next(),
            label,
            control: Mutex::new(Control::default()),
            token: CancellationToken::new(),
            outcome,
        })
    }

    pub(crate) fn id(&self) -> OperationId {
        self.id
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn status(&self) -> OperationStatus {
        self.outcome.borrow().status()
    }

    /// Install `holder` as the resource executing this operation.
    ///
    /// Returns false when cancellation was requested first; the operation must not
    /// run in that case.
    pub(crate) fn begin(&self, holder: Arc<dyn Interruptible>) -> bool {
        let mut control = self.control.lock();
        if control.cancel_requested {
            return false;
        }
        holder.clear_interrupt();
        control.holder = Some(holder);
        self.outcome.send_if_modified(|outcome| {
            if matches!(outcome, Outcome::Pending) {
                *outcome = Outcome::Running;
                true
            } else {
                false
            }
        });
        true
    }

    /// Clear the holder once the work has actually stopped.
    pub(crate) fn end(&self) {
        self.control.lock().holder = None;
    }

    /// Publish a terminal outcome unless one was already published.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> bool {
        self.outcome.send_if_modified(move |current| {
            if current.is_terminal() {
                false
            } else {
                *current = outcome;
                true
            }
        })
    }

    pub(crate) fn request_cancel(&self) {
        if self.outcome.borrow().is_terminal() {
            return;
        }
        {
            let mut control = self.control.lock();
            if control.cancel_requested {
                return;
            }
            control.cancel_requested = true;
            if let Some(holder) = control.holder.as_ref() {
                debug!(operation_id = %self.id, label = %self.label, "Interrupting running operation");
                holder.interrupt();
            }
        }
        if self.settle(Outcome::Cancelled) {
            debug!(operation_id = %self.id, label = %self.label, "Operation cancelled");
        }
        self.token.cancel();
    }
}

/// Type-erased view used by [`CancelHandle`]
trait CancelTarget: Send + Sync {
    fn cancel(&self);
    fn status(&self) -> OperationStatus;
    fn id(&self) -> OperationId;
}

impl<T: Clone + Send + Sync + 'static> CancelTarget for OperationShared<T> {
    fn cancel(&self) {
        self.request_cancel();
    }

    fn status(&self) -> OperationStatus {
        OperationShared::status(self)
    }

    fn id(&self) -> OperationId {
        self.id
    }
}

/// Cloneable handle that can only cancel an operation
#[derive(Clone)]
pub struct CancelHandle {
    target: Arc<dyn CancelTarget>,
}

impl CancelHandle {
    /// Cancel the operation. Returns promptly even if the resource is slow to stop.
    pub fn cancel(&self) {
        self.target.cancel();
    }

    pub fn status(&self) -> OperationStatus {
        self.target.status()
    }

    pub fn id(&self) -> OperationId {
        self.target.id()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

/// Handle to one submitted operation
pub struct OperationHandle<T> {
    shared: Arc<OperationShared<T>>,
    outcome: watch::Receiver<Outcome<T>>,
}

impl<T: Clone + Send + Sync + 'static> OperationHandle<T> {
    pub(crate) fn new(shared: Arc<OperationShared<T>>) -> Self {
        let outcome = shared.outcome.subscribe();
        Self { shared, outcome }
    }

    pub fn id(&self) -> OperationId {
        self.shared.id()
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }

    pub fn status(&self) -> OperationStatus {
        self.outcome.borrow().status()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Cancel the operation.
    ///
    /// Not started: it never runs. Running: the resource is interrupted before this
    /// returns and waiters see `Cancelled` immediately, while the executor keeps the
    /// exclusive lock until the abandoned work has actually stopped.
    pub fn cancel(&self) {
        self.shared.request_cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            target: self.shared.clone(),
        }
    }

    /// Wait for the operation to finish.
    ///
    /// With a `timeout`, returns [`OperationError::TimedOut`] once it elapses; the
    /// operation keeps going and can be awaited again.
    pub async fn result(&self, timeout: Option<Duration>) -> Result<T, OperationError> {
        let mut rx = self.outcome.clone();
        let wait = async move {
            match rx.wait_for(Outcome::is_terminal).await {
                Ok(outcome) => (*outcome).clone(),
                Err(_) => Outcome::Cancelled,
            }
        };

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| OperationError::TimedOut)?,
            None => wait.await,
        };

        match outcome {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(err) => Err(err),
            Outcome::Cancelled | Outcome::Pending | Outcome::Running => {
                Err(OperationError::Cancelled)
            }
        }
    }
}

impl<T> fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.shared.id)
            .field("label", &self.shared.label)
            .field("status", &self.outcome.borrow().status())
            .finish()
    }
}
