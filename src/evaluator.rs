//! Evaluator collaborator interface
//!
//! The evaluator is the expensive, not-thread-safe resource hosted by the services.
//! Its internals are out of scope; this module only fixes the calls the host
//! makes and the initializer that brings one up in the background.

use crate::console::AsyncWriter;
use crate::error::EvalError;
use crate::resource::{Interruptible, LazyResource};
use crate::value::Value;
use tracing::debug;

/// A language evaluator.
///
/// `import` and `call` must only ever run under the executor's exclusive lock;
/// `interrupt` may arrive from any thread while a call is in progress.
pub trait Evaluator: Interruptible + 'static {
    /// Load a module into the evaluator's environment.
    fn import(&self, module: &str) -> Result<(), EvalError>;

    /// Call a function. `Ok(None)` means the function produced no value.
    fn call(&self, function: &str, args: &[Value]) -> Result<Option<Value>, EvalError>;
}

/// Creates evaluators. May be slow and may fail.
pub trait EvaluatorFactory: Send + 'static {
    type Evaluator: Evaluator;

    fn create(&self) -> Result<Self::Evaluator, EvalError>;
}

impl<F, E> EvaluatorFactory for F
where
    F: Fn() -> Result<E, EvalError> + Send + 'static,
    E: Evaluator,
{
    type Evaluator = E;

    fn create(&self) -> Result<E, EvalError> {
        self()
    }
}

/// Construct an evaluator in the background and import `modules` into it.
///
/// Progress lines go to `console` when one is given. A failed import fails the
/// whole resource.
pub fn lazy_import<F>(
    name: impl Into<String>,
    factory: F,
    modules: Vec<String>,
    console: Option<AsyncWriter>,
) -> LazyResource<F::Evaluator>
where
    F: EvaluatorFactory,
{
    let name = name.into();
    let label = name.clone();
    LazyResource::construct(name, move || {
        announce(
            console.as_ref(),
            &format!("Initializing evaluator for: {}...\n", label),
        );
        let evaluator = factory.create()?;
        for module in &modules {
            debug!(resource = %label, module = %module, "Importing module");
            evaluator.import(module)?;
        }
        announce(
            console.as_ref(),
            &format!("Finished initializing evaluator for: {}\n", label),
        );
        Ok::<_, EvalError>(evaluator)
    })
}

fn announce(console: Option<&AsyncWriter>, line: &str) {
    if let Some(console) = console {
        if console.write_text(line).is_ok() {
            console.flush();
        }
    }
}
