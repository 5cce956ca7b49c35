//! Shared test utilities for integration tests
//!
//! A scripted evaluator that records what the host does to it, and helpers for
//! isolating environment variables between tests.

use evalhost::{EvalError, Evaluator, Interruptible, OperationHandle, OperationStatus, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// What the scripted evaluator saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Import(String),
    CallStarted(String),
    CallFinished(String),
    Interrupted,
}

/// How a scripted function behaves
#[derive(Debug, Clone)]
pub enum Script {
    Return(Option<Value>),
    /// Run for the given time unless interrupted, then return the value
    Busy(Duration, Option<Value>),
    Fail(EvalError),
}

#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    interrupted: AtomicBool,
    interrupts: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    events: Mutex<Vec<Event>>,
    arguments: Mutex<Vec<(String, Vec<Value>)>>,
    scripts: Mutex<HashMap<String, Script>>,
    failing_imports: Mutex<Vec<String>>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, function: &str, script: Script) -> Self {
        self.scripts.lock().insert(function.to_string(), script);
        self
    }

    pub fn failing_import(self, module: &str) -> Self {
        self.failing_imports.lock().push(module.to_string());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::CallStarted(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Arguments of every call to `function`, in call order
    pub fn arguments_of(&self, function: &str) -> Vec<Vec<Value>> {
        self.arguments
            .lock()
            .iter()
            .filter(|(name, _)| name == function)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// Highest number of calls ever running at the same time
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn run(&self, function: &str) -> Result<Option<Value>, EvalError> {
        let script = self
            .scripts
            .lock()
            .get(function)
            .cloned()
            .unwrap_or(Script::Return(None));

        match script {
            Script::Return(value) => Ok(value),
            Script::Fail(err) => Err(err),
            Script::Busy(duration, value) => {
                let deadline = Instant::now() + duration;
                while Instant::now() < deadline {
                    if self.interrupted.load(Ordering::SeqCst) {
                        return Err(EvalError::Interrupted);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(value)
            }
        }
    }
}

impl Interruptible for ScriptedEvaluator {
    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
        self.events.lock().push(Event::Interrupted);
    }

    fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

impl Evaluator for ScriptedEvaluator {
    fn import(&self, module: &str) -> Result<(), EvalError> {
        self.events.lock().push(Event::Import(module.to_string()));
        if self.failing_imports.lock().iter().any(|m| m == module) {
            return Err(EvalError::Import {
                module: module.to_string(),
                message: "no such module".to_string(),
            });
        }
        Ok(())
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
        self.arguments
            .lock()
            .push((function.to_string(), args.to_vec()));
        self.events
            .lock()
            .push(Event::CallStarted(function.to_string()));
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let result = self.run(function);

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .push(Event::CallFinished(function.to_string()));
        result
    }
}

/// Poll until the operation reaches `status`, panicking after two seconds.
pub async fn wait_for_status<T: Clone + Send + Sync + 'static>(
    handle: &OperationHandle<T>,
    status: OperationStatus,
) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.status() != status {
        assert!(
            Instant::now() < deadline,
            "operation {} stuck in {:?}, expected {:?}",
            handle.id(),
            handle.status(),
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Environment variable state to restore after test
struct EnvState {
    vars: Vec<(&'static str, Option<String>)>,
}

const ISOLATED_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "EVALHOST__CONSOLE__BATCH_THRESHOLD",
    "EVALHOST__SERVICES__OPERATION_TIMEOUT_MS",
    "EVALHOST__SERVICES__CHECKER__NAME",
    "EVALHOST__LOGGING__LEVEL",
];

impl EnvState {
    fn capture() -> Self {
        Self {
            vars: ISOLATED_VARS
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.vars {
            match value {
                Some(orig) => std::env::set_var(name, orig),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointing into `test_dir` and the
/// EVALHOST__ overrides cleared. The environment is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_config_home = test_dir.path().join("config");
    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_config_home).unwrap();
    std::fs::create_dir_all(&test_home).unwrap();

    for name in ISOLATED_VARS.iter().skip(2) {
        std::env::remove_var(name);
    }
    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_config_home.to_str().unwrap());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    env_state.restore();

    match result {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
