//! Background-initialized resource
//!
//! `LazyResource` starts its initializer on a dedicated, detached thread the moment
//! it is constructed. The outcome is published once through a watch channel, so any
//! number of waiters observe the same value or error and initialization never runs
//! twice.

use crate::error::ResourceError;
use crate::resource::panic_message;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Observable lifecycle state of a lazy resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl ResourceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceState::Ready | ResourceState::Failed)
    }
}

enum Slot<T> {
    Uninitialized,
    Initializing,
    Ready(Arc<T>),
    Failed(String),
}

impl<T> Slot<T> {
    fn state(&self) -> ResourceState {
        match self {
            Slot::Uninitialized => ResourceState::Uninitialized,
            Slot::Initializing => ResourceState::Initializing,
            Slot::Ready(_) => ResourceState::Ready,
            Slot::Failed(_) => ResourceState::Failed,
        }
    }

    fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Uninitialized => Slot::Uninitialized,
            Slot::Initializing => Slot::Initializing,
            Slot::Ready(value) => Slot::Ready(Arc::clone(value)),
            Slot::Failed(cause) => Slot::Failed(cause.clone()),
        }
    }
}

/// Decrements the waiter count when a `get` finishes or is dropped
struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A resource constructed once, in the background
pub struct LazyResource<T> {
    name: Arc<str>,
    slot: watch::Receiver<Slot<T>>,
    waiters: Arc<AtomicUsize>,
}

impl<T> Clone for LazyResource<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            slot: self.slot.clone(),
            waiters: Arc::clone(&self.waiters),
        }
    }
}

impl<T> fmt::Debug for LazyResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyResource")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("waiters", &self.waiters())
            .finish()
    }
}

impl<T: Send + Sync + 'static> LazyResource<T> {
    /// Start initializing a resource on a background thread.
    ///
    /// Never blocks. An error returned by `initializer`, or a panic inside it, is
    /// logged against `name` and becomes the resource's terminal error. The thread
    /// is detached and does not keep the process alive.
    pub fn construct<F, E>(name: impl Into<String>, initializer: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: fmt::Display,
    {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = watch::channel(Slot::Uninitialized);
        let tx = Arc::new(tx);

        let thread_tx = Arc::clone(&tx);
        let thread_name = Arc::clone(&name);
        let spawned = thread::Builder::new()
            .name(format!("Background initializer for: {}", name))
            .spawn(move || {
                thread_tx.send_replace(Slot::Initializing);
                debug!(resource = %thread_name, "Initializing resource");
                let started = Instant::now();

                let slot = match panic::catch_unwind(AssertUnwindSafe(initializer)) {
                    Ok(Ok(value)) => Slot::Ready(Arc::new(value)),
                    Ok(Err(err)) => Slot::Failed(err.to_string()),
                    Err(payload) => {
                        Slot::Failed(format!("initializer panicked: {}", panic_message(payload.as_ref())))
                    }
                };

                match &slot {
                    Slot::Failed(cause) => {
                        error!(resource = %thread_name, error = %cause, "Cannot initialize resource");
                    }
                    _ => {
                        info!(
                            resource = %thread_name,
                            duration_ms = started.elapsed().as_millis() as u64,
                            "Resource ready"
                        );
                    }
                }
                thread_tx.send_replace(slot);
            });

        if let Err(err) = spawned {
            error!(resource = %name, error = %err, "Cannot start background initializer");
            tx.send_replace(Slot::Failed(format!("cannot start initializer thread: {}", err)));
        }

        Self {
            name,
            slot: rx,
            waiters: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<T> LazyResource<T> {
    /// A resource that is already available.
    pub fn ready(name: impl Into<String>, value: T) -> Self {
        Self::settled(name, Slot::Ready(Arc::new(value)))
    }

    /// A resource whose construction already failed.
    pub fn failed(name: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::settled(name, Slot::Failed(cause.into()))
    }

    fn settled(name: impl Into<String>, slot: Slot<T>) -> Self {
        let (_tx, rx) = watch::channel(slot);
        Self {
            name: Arc::from(name.into()),
            slot: rx,
            waiters: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ResourceState {
        self.slot.borrow().state()
    }

    /// Number of callers currently suspended in [`LazyResource::get`]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Non-blocking peek: `None` while initialization is still running.
    pub fn try_get(&self) -> Option<Result<Arc<T>, ResourceError>> {
        let slot = self.slot.borrow().clone();
        self.resolve(slot)
    }

    /// Wait until the resource is ready or has failed.
    ///
    /// With a `timeout`, returns [`ResourceError::NotReady`] once it elapses so the
    /// caller can check its own cancellation and wait again.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<Arc<T>, ResourceError> {
        let _waiter = WaiterGuard::enter(&self.waiters);
        let mut rx = self.slot.clone();
        let wait = async move {
            match rx.wait_for(Slot::is_terminal).await {
                Ok(slot) => (*slot).clone(),
                Err(_) => Slot::Failed("initializer exited without a result".to_string()),
            }
        };

        let slot = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(slot) => slot,
                Err(_) => {
                    return Err(ResourceError::NotReady {
                        name: self.name.to_string(),
                    })
                }
            },
            None => wait.await,
        };

        self.resolve(slot).ok_or_else(|| ResourceError::NotReady {
            name: self.name.to_string(),
        })?
    }

    fn resolve(&self, slot: Slot<T>) -> Option<Result<Arc<T>, ResourceError>> {
        match slot {
            Slot::Ready(value) => Some(Ok(value)),
            Slot::Failed(cause) => Some(Err(ResourceError::Unavailable {
                name: self.name.to_string(),
                cause,
            })),
            Slot::Uninitialized | Slot::Initializing => None,
        }
    }
}
