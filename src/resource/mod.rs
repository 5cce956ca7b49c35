//! Shared Resource Lifecycle
//!
//! Lazy one-shot construction of an expensive resource, serialized access to it,
//! and cancellable operations that forward cancellation to the running call as an
//! interrupt.

pub mod executor;
pub mod lazy;
pub mod operation;

pub use executor::{ExclusiveExecutor, ExecutorStats};
pub use lazy::{LazyResource, ResourceState};
pub use operation::{CancelHandle, Interruptible, OperationHandle, OperationId, OperationStatus};

use std::any::Any;

/// Render a caught panic payload for diagnostics.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
