//! Evalhost: hosting for a shared language evaluator
//!
//! Brings up an expensive evaluator in the background, serializes every call into
//! it behind one exclusive lock, and lets callers cancel work that is queued or
//! already running. On top sit the type checking and summary services, and a
//! console writer that keeps producers off the terminal.

pub mod config;
pub mod console;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod resource;
pub mod service;
pub mod value;

pub use config::{ConfigLoader, HostConfig, ValidationError};
pub use console::{AsyncWriter, ConsoleConfig};
pub use error::{EvalError, OperationError, ResourceError, SetupError};
pub use evaluator::{lazy_import, Evaluator, EvaluatorFactory};
pub use resource::{
    CancelHandle, ExclusiveExecutor, ExecutorStats, Interruptible, LazyResource, OperationHandle,
    OperationId, OperationStatus, ResourceState,
};
pub use service::{ServiceCall, ServicesConfig, SummaryService, TypeCheckService};
pub use value::{PathConfig, SourceLocation, Value};
