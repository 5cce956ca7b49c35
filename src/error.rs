//! Error types for the evaluator host.

use thiserror::Error;

/// Errors raised by the evaluator itself (the hosted resource)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("Evaluation interrupted")]
    Interrupted,

    #[error("Undefined function: {0}")]
    UndefinedFunction(String),

    #[error("Import of {module} failed: {message}")]
    Import { module: String, message: String },

    #[error("Evaluator construction failed: {0}")]
    Construction(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors observed while retrieving a lazily initialized resource
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The wait bound elapsed before initialization finished. Not terminal.
    #[error("Resource '{name}' is not ready yet")]
    NotReady { name: String },

    #[error("Resource '{name}' is unavailable: {cause}")]
    Unavailable { name: String, cause: String },
}

/// Errors surfaced by operations submitted to an exclusive executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("Initialization of '{resource}' failed: {cause}")]
    InitializationFailed { resource: String, cause: String },

    #[error("Operation failed: {0}")]
    OperationFailed(#[from] EvalError),

    #[error("Operation cancelled")]
    Cancelled,

    /// The wait bound elapsed before the operation finished. Not terminal.
    #[error("Timed out waiting for the operation result")]
    TimedOut,
}

impl From<ResourceError> for OperationError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::NotReady { name } => OperationError::InitializationFailed {
                resource: name,
                cause: "resource never became ready".to_string(),
            },
            ResourceError::Unavailable { name, cause } => OperationError::InitializationFailed {
                resource: name,
                cause,
            },
        }
    }
}

/// Errors raised while loading configuration or installing logging
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for SetupError {
    fn from(err: config::ConfigError) -> Self {
        SetupError::Config(err.to_string())
    }
}
