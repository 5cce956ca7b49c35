//! Pending service results
//!
//! A `ServiceCall` is what a service operation hands back: either an answer that
//! was known without touching the evaluator, or an operation in flight. Every
//! failure is absorbed into the operation's default value and logged.

use crate::error::OperationError;
use crate::resource::{CancelHandle, OperationHandle, OperationId};
use std::fmt;
use tracing::{debug, error};

enum CallState<T: Clone + Send + Sync + 'static> {
    Resolved(T),
    Pending(OperationHandle<T>),
}

/// Result of a service operation, cancellable while pending.
///
/// Dropping an unfinished call cancels the underlying operation.
pub struct ServiceCall<T: Clone + Send + Sync + 'static> {
    operation: &'static str,
    target: String,
    fallback: T,
    state: CallState<T>,
}

impl<T: Clone + Send + Sync + 'static> ServiceCall<T> {
    pub(crate) fn resolved(operation: &'static str, target: impl Into<String>, value: T) -> Self {
        Self {
            operation,
            target: target.into(),
            fallback: value.clone(),
            state: CallState::Resolved(value),
        }
    }

    pub(crate) fn pending(
        operation: &'static str,
        target: impl Into<String>,
        fallback: T,
        handle: OperationHandle<T>,
    ) -> Self {
        Self {
            operation,
            target: target.into(),
            fallback,
            state: CallState::Pending(handle),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// True when the answer was known without submitting work
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, CallState::Resolved(_))
    }

    pub fn operation_id(&self) -> Option<OperationId> {
        match &self.state {
            CallState::Resolved(_) => None,
            CallState::Pending(handle) => Some(handle.id()),
        }
    }

    /// Cancel the underlying operation, interrupting the evaluator if it is running.
    pub fn cancel(&self) {
        if let CallState::Pending(handle) = &self.state {
            handle.cancel();
        }
    }

    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        match &self.state {
            CallState::Resolved(_) => None,
            CallState::Pending(handle) => Some(handle.cancel_handle()),
        }
    }

    /// The operation's value, or its default on any failure.
    pub async fn result(&self) -> T {
        self.result_with_diagnostic().await.0
    }

    /// The operation's value, or its default together with the absorbed error.
    pub async fn result_with_diagnostic(&self) -> (T, Option<OperationError>) {
        let handle = match &self.state {
            CallState::Resolved(value) => return (value.clone(), None),
            CallState::Pending(handle) => handle,
        };

        let err = match handle.result(None).await {
            Ok(value) => return (value, None),
            Err(err) => err,
        };

        match &err {
            OperationError::Cancelled => {
                debug!(operation = self.operation, target = %self.target, "Operation cancelled");
            }
            _ => {
                error!(
                    operation = self.operation,
                    target = %self.target,
                    error = %err,
                    "Operation failed, returning default result"
                );
            }
        }
        (self.fallback.clone(), Some(err))
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for ServiceCall<T> {
    fn drop(&mut self) {
        if let CallState::Pending(handle) = &self.state {
            if !handle.is_finished() {
                debug!(operation = self.operation, target = %self.target, "Abandoned call, cancelling");
                handle.cancel();
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for ServiceCall<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.state {
            CallState::Resolved(_) => "resolved".to_string(),
            CallState::Pending(handle) => format!("{:?}", handle.status()),
        };
        f.debug_struct("ServiceCall")
            .field("operation", &self.operation)
            .field("target", &self.target)
            .field("status", &status)
            .finish()
    }
}
