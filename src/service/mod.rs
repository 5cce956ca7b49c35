//! Evaluator-backed services
//!
//! Each service owns one executor, and through it one lazily constructed
//! evaluator. Every operation filters its input first, returns the empty answer
//! when nothing is left to do, and otherwise runs as a cancellable operation whose
//! failures collapse into that same empty answer.

pub mod call;
pub mod checker;
pub mod filter;
pub mod summary;

pub use call::ServiceCall;
pub use checker::TypeCheckService;
pub use filter::{IgnoreRule, LocationFilter};
pub use summary::SummaryService;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name and start-up imports of one service's evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Resource name used in logs and thread names
    pub name: String,
    /// Modules imported, in order, while the evaluator is initialized
    #[serde(default)]
    pub modules: Vec<String>,
}

fn default_checker() -> EvaluatorConfig {
    EvaluatorConfig {
        name: "rascal-core type checker".to_string(),
        modules: vec!["lang::rascalcore::check::Checker".to_string()],
    }
}

fn default_summary() -> EvaluatorConfig {
    EvaluatorConfig {
        name: "rascal-core summary".to_string(),
        modules: vec![
            "lang::rascalcore::check::Summary".to_string(),
            "lang::rascalcore::check::Checker".to_string(),
        ],
    }
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_checker")]
    pub checker: EvaluatorConfig,

    #[serde(default = "default_summary")]
    pub summary: EvaluatorConfig,

    /// Cancel operations that run longer than this (milliseconds). Unbounded if unset.
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,

    /// Locations never sent to the checker
    #[serde(default = "filter::default_ignore_rules")]
    pub ignored: Vec<IgnoreRule>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            checker: default_checker(),
            summary: default_summary(),
            operation_timeout_ms: None,
            ignored: filter::default_ignore_rules(),
        }
    }
}

impl ServicesConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), Vec<(String, String)>> {
        let mut errors = Vec::new();
        for (service, evaluator) in [("checker", &self.checker), ("summary", &self.summary)] {
            if evaluator.name.trim().is_empty() {
                errors.push((service.to_string(), "evaluator name cannot be empty".to_string()));
            }
            if evaluator.modules.iter().any(|m| m.trim().is_empty()) {
                errors.push((service.to_string(), "module names cannot be empty".to_string()));
            }
        }
        if self.operation_timeout_ms == Some(0) {
            errors.push((
                "services".to_string(),
                "operation_timeout_ms must be positive when set".to_string(),
            ));
        }
        for rule in &self.ignored {
            if rule.scheme.is_empty() {
                errors.push(("services".to_string(), "ignore rule without scheme".to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
