//! Summary and outline service

use crate::console::AsyncWriter;
use crate::evaluator::{lazy_import, Evaluator, EvaluatorFactory};
use crate::resource::ExclusiveExecutor;
use crate::service::call::ServiceCall;
use crate::service::ServicesConfig;
use crate::value::{PathConfig, Value};
use std::time::Duration;
use tracing::debug;

pub const TMODEL_FUNCTION: &str = "rascalTModelFromName";
pub const SUMMARY_FUNCTION: &str = "makeSummary";
pub const OUTLINE_FUNCTION: &str = "outline";

pub struct SummaryService<E: Evaluator> {
    executor: ExclusiveExecutor<E>,
    timeout: Option<Duration>,
}

impl<E: Evaluator> SummaryService<E> {
    pub fn new(executor: ExclusiveExecutor<E>, config: &ServicesConfig) -> Self {
        Self {
            executor,
            timeout: config.operation_timeout(),
        }
    }

    pub fn start<F>(factory: F, config: &ServicesConfig, console: Option<AsyncWriter>) -> Self
    where
        F: EvaluatorFactory<Evaluator = E>,
    {
        let resource = lazy_import(
            config.summary.name.clone(),
            factory,
            config.summary.modules.clone(),
            console,
        );
        Self::new(ExclusiveExecutor::new(resource), config)
    }

    pub fn executor(&self) -> &ExclusiveExecutor<E> {
        &self.executor
    }

    /// Structural summary of a module, or `None` when it cannot be produced.
    ///
    /// The type model and the summary are computed under one lock acquisition.
    pub fn summarize(&self, module_name: &str, pcfg: &PathConfig) -> ServiceCall<Option<Value>> {
        if module_name.trim().is_empty() {
            debug!("Empty module name, no summary");
            return ServiceCall::resolved("summarize", "", None);
        }

        let name = Value::str(module_name);
        let pcfg = pcfg.to_value();
        let handle = self
            .executor
            .submit_with_deadline(SUMMARY_FUNCTION, self.timeout, move |evaluator: &E| {
                let tmodel = match evaluator.call(TMODEL_FUNCTION, &[name.clone(), pcfg])? {
                    Some(tmodel) => tmodel,
                    None => return Ok(None),
                };
                evaluator.call(SUMMARY_FUNCTION, &[tmodel, name])
            });
        ServiceCall::pending("summarize", module_name, None, handle)
    }

    /// Outline of a parsed module, or `None` when it cannot be produced.
    pub fn outline(&self, module_tree: Value) -> ServiceCall<Option<Value>> {
        let target = match &module_tree {
            Value::Node { name, .. } => name.clone(),
            other => other.describe(),
        };
        let handle = self
            .executor
            .submit_with_deadline(OUTLINE_FUNCTION, self.timeout, move |evaluator: &E| {
                evaluator.call(OUTLINE_FUNCTION, &[module_tree])
            });
        ServiceCall::pending("outline", target, None, handle)
    }
}
