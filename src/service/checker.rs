//! Type checking service
//!
//! `compile` and `compile_all` run the evaluator's checker functions and return
//! the resulting list of messages. Nothing here ever fails from the caller's point
//! of view: every failure yields an empty message list.

use crate::console::AsyncWriter;
use crate::error::EvalError;
use crate::evaluator::{lazy_import, Evaluator, EvaluatorFactory};
use crate::resource::ExclusiveExecutor;
use crate::service::call::ServiceCall;
use crate::service::filter::LocationFilter;
use crate::service::ServicesConfig;
use crate::value::{PathConfig, SourceLocation, Value};
use std::time::Duration;
use tracing::debug;

/// Checker entry point for a list of source files
pub const CHECK_FUNCTION: &str = "check";
/// Checker entry point for a whole source folder
pub const CHECK_ALL_FUNCTION: &str = "checkAll";

pub struct TypeCheckService<E: Evaluator> {
    executor: ExclusiveExecutor<E>,
    filter: LocationFilter,
    timeout: Option<Duration>,
}

impl<E: Evaluator> TypeCheckService<E> {
    pub fn new(executor: ExclusiveExecutor<E>, config: &ServicesConfig) -> Self {
        Self {
            executor,
            filter: LocationFilter::new(config.ignored.clone()),
            timeout: config.operation_timeout(),
        }
    }

    /// Start constructing the checker evaluator in the background and return
    /// immediately.
    pub fn start<F>(factory: F, config: &ServicesConfig, console: Option<AsyncWriter>) -> Self
    where
        F: EvaluatorFactory<Evaluator = E>,
    {
        let resource = lazy_import(
            config.checker.name.clone(),
            factory,
            config.checker.modules.clone(),
            console,
        );
        Self::new(ExclusiveExecutor::new(resource), config)
    }

    pub fn executor(&self) -> &ExclusiveExecutor<E> {
        &self.executor
    }

    /// Check a set of source files.
    ///
    /// Ignored locations and non-location values are dropped first; if nothing
    /// remains the call resolves to an empty list without touching the evaluator.
    pub fn compile(&self, files: Vec<Value>, pcfg: &PathConfig) -> ServiceCall<Vec<Value>> {
        let submitted = files.len();
        let files = self.filter.retain_sources(files);
        if files.is_empty() {
            debug!(submitted, "No checkable sources, skipping type check");
            return ServiceCall::resolved("compile", "no sources", Vec::new());
        }

        let target = describe_sources(&files);
        let args = vec![Value::List(files), pcfg.to_value()];
        let handle = self
            .executor
            .submit_with_deadline(CHECK_FUNCTION, self.timeout, move |evaluator: &E| {
                message_list(evaluator.call(CHECK_FUNCTION, &args)?)
            });
        ServiceCall::pending("compile", target, Vec::new(), handle)
    }

    /// Check every source under `folder`.
    pub fn compile_all(&self, folder: SourceLocation, pcfg: &PathConfig) -> ServiceCall<Vec<Value>> {
        if self.filter.is_ignored(&folder) {
            debug!(folder = %folder, "Ignored folder, skipping type check");
            return ServiceCall::resolved("compile_all", folder.to_string(), Vec::new());
        }

        let target = folder.to_string();
        let args = vec![Value::Loc(folder), pcfg.to_value()];
        let handle = self
            .executor
            .submit_with_deadline(CHECK_ALL_FUNCTION, self.timeout, move |evaluator: &E| {
                message_list(evaluator.call(CHECK_ALL_FUNCTION, &args)?)
            });
        ServiceCall::pending("compile_all", target, Vec::new(), handle)
    }
}

/// An absent result is an empty message list; anything but a list is an error.
fn message_list(result: Option<Value>) -> Result<Vec<Value>, EvalError> {
    match result {
        None => Ok(Vec::new()),
        Some(Value::List(messages)) => Ok(messages),
        Some(other) => Err(EvalError::Runtime(format!(
            "expected a list of messages, got {}",
            other.describe()
        ))),
    }
}

fn describe_sources(files: &[Value]) -> String {
    match files {
        [single] => single.describe(),
        [first, rest @ ..] => format!("{} (+{} more)", first.describe(), rest.len()),
        [] => String::new(),
    }
}
