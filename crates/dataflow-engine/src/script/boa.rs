//! JavaScript routines on the boa engine
//!
//! Every invocation evaluates the routine in a fresh [`Context`], so
//! routines cannot leak state into each other. Inputs, config and globals
//! cross the boundary as JSON text and the result comes back the same way.
//!
//! The interpreter runs on a blocking thread and yields every few thousand
//! instructions. At each yield the evaluation checks its [`Interrupt`], so a
//! routine whose caller gave up (a timed out invocation) stops there
//! instead of running on. An `async` routine is awaited by draining the
//! promise job queue under the same checks.

use std::cell::RefCell;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use boa_engine::builtins::promise::PromiseState;
use boa_engine::job::{JobExecutor, SimpleJobExecutor};
use boa_engine::{js_string, Context, JsError, JsValue, Script, Source};
use serde_json::Value;

use super::{CompiledRoutine, InvocationMode, ScriptEngine};
use crate::config::EngineConfig;
use crate::constants::routine::ENTRY_POINT;
use crate::error::{EngineError, Result};
use crate::types::PortValues;

/// VM cost units between two interrupt checks
const YIELD_BUDGET: u32 = 4096;

/// Interpreter limits applied to every context
#[derive(Debug, Clone, Copy)]
struct Limits {
    loop_iterations: u64,
    recursion: usize,
    /// Wall-clock bound on the compile check, which has no caller timeout
    compile_time: Duration,
}

impl Limits {
    fn context(&self) -> Context {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.loop_iterations);
        context.runtime_limits_mut().set_recursion_limit(self.recursion);
        context
    }
}

/// Script engine for JavaScript routines
#[derive(Debug, Clone)]
pub struct BoaScriptEngine {
    mode: InvocationMode,
    limits: Limits,
}

impl BoaScriptEngine {
    /// Create an engine with the interpreter limits from `config`
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            mode: InvocationMode::CallExecute,
            limits: Limits {
                loop_iterations: config.loop_iteration_limit,
                recursion: config.recursion_limit,
                compile_time: Duration::from_millis(config.invocation_timeout_ms),
            },
        }
    }

    /// Choose how sources become callables
    pub fn with_mode(mut self, mode: InvocationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }
}

impl Default for BoaScriptEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ScriptEngine for BoaScriptEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledRoutine>> {
        let check = match self.mode {
            InvocationMode::CallExecute => format!("{}\n;typeof {}", source, ENTRY_POINT),
            InvocationMode::FunctionBody => format!("typeof {}", body_function(source)),
        };

        let interrupt = Interrupt::with_deadline(self.limits.compile_time);
        let mut context = self.limits.context();
        let kind = eval_value(&mut context, &check, &interrupt)
            .and_then(|value| display(&mut context, &value))
            .map_err(EngineError::compilation)?;
        if kind != "function" {
            return Err(EngineError::compilation(format!(
                "routine must define function {}(inputs, config, globals)",
                ENTRY_POINT
            )));
        }

        Ok(Arc::new(BoaRoutine {
            source: Arc::from(source),
            mode: self.mode,
            limits: self.limits,
        }))
    }

    fn name(&self) -> &'static str {
        "boa"
    }
}

/// A checked JavaScript routine
struct BoaRoutine {
    source: Arc<str>,
    mode: InvocationMode,
    limits: Limits,
}

#[async_trait]
impl CompiledRoutine for BoaRoutine {
    async fn invoke(&self, inputs: &PortValues, config: &Value, globals: &PortValues) -> Result<Value> {
        let script = invocation_script(&self.source, self.mode, inputs, config, globals)?;
        let limits = self.limits;

        // Dropping this future (a timeout) stops the interpreter at its next yield
        let interrupt = Interrupt::new();
        let _stop = StopOnDrop(interrupt.clone());

        let output = tokio::task::spawn_blocking(move || run_routine(&script, limits, &interrupt))
            .await
            .map_err(|e| EngineError::invocation(format!("script execution panicked: {}", e)))?
            .map_err(EngineError::invocation)?;

        Ok(serde_json::from_str(&output)?)
    }
}

/// Stop signal checked by a running evaluation at every yield
#[derive(Debug, Clone)]
struct Interrupt {
    stopped: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Interrupt {
    fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    fn with_deadline(after: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + after),
            ..Self::new()
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err("routine interrupted".to_string());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err("routine exceeded its time limit".to_string())
            }
            _ => Ok(()),
        }
    }
}

struct StopOnDrop(Interrupt);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Poll a boa future on the current thread until it completes
///
/// Boa futures only return `Pending` to yield and wake themselves before
/// doing so, so polling again right away is the whole schedule.
fn drive<F: Future>(future: F, interrupt: &Interrupt) -> std::result::Result<F::Output, String> {
    let mut future = pin!(future);
    let mut cx = TaskContext::from_waker(futures_util::task::noop_waker_ref());
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Ok(output);
        }
        interrupt.check()?;
    }
}

/// Wrap a routine body in a function taking the routine arguments
fn body_function(source: &str) -> String {
    format!("(function(inputs, config, globals) {{\n{}\n}})", source)
}

/// Build the script for one invocation
///
/// The script's completion value is the routine's return value, which may
/// be a promise.
fn invocation_script(
    source: &str,
    mode: InvocationMode,
    inputs: &PortValues,
    config: &Value,
    globals: &PortValues,
) -> Result<String> {
    let call = match mode {
        InvocationMode::CallExecute => format!(
            "{}\n;{}(__inputs, __config, __globals);",
            source, ENTRY_POINT
        ),
        InvocationMode::FunctionBody => format!(
            "{}(__inputs, __config, __globals);",
            body_function(source)
        ),
    };

    Ok(format!(
        "var __inputs = {};\nvar __config = {};\nvar __globals = {};\n{}",
        serde_json::to_string(inputs)?,
        serde_json::to_string(config)?,
        serde_json::to_string(globals)?,
        call,
    ))
}

/// JSON text of `__result`. `undefined` becomes `null`; a value JSON cannot
/// represent becomes the string naming its type.
const RESULT_TO_JSON: &str = "var __json = JSON.stringify(__result === undefined ? null : __result);\n\
typeof __json === 'string' ? __json : JSON.stringify(typeof __result);";

/// Evaluate an invocation script and return its settled result as JSON text
fn run_routine(script: &str, limits: Limits, interrupt: &Interrupt) -> std::result::Result<String, String> {
    let mut context = limits.context();
    let value = eval_value(&mut context, script, interrupt)?;
    let value = settle(&mut context, value, interrupt)?;

    context
        .global_object()
        .set(js_string!("__result"), value, true, &mut context)
        .map_err(|e| describe(e, &mut context))?;
    let json = context
        .eval(Source::from_bytes(RESULT_TO_JSON))
        .map_err(|e| describe(e, &mut context))?;
    display(&mut context, &json)
}

fn eval_value(context: &mut Context, script: &str, interrupt: &Interrupt) -> std::result::Result<JsValue, String> {
    let script = Script::parse(Source::from_bytes(script), None, context).map_err(|e| describe(e, context))?;
    let evaluated = drive(script.evaluate_async_with_budget(context, YIELD_BUDGET), interrupt)?;
    evaluated.map_err(|e| describe(e, context))
}

/// Await a promise result by running the queued jobs; other values pass through
fn settle(context: &mut Context, value: JsValue, interrupt: &Interrupt) -> std::result::Result<JsValue, String> {
    let Some(promise) = value.as_promise() else {
        return Ok(value);
    };

    let drained = match context.downcast_job_executor::<SimpleJobExecutor>() {
        Some(jobs) => {
            let cell = RefCell::new(&mut *context);
            let drained = drive(jobs.run_jobs_async(&cell), interrupt);
            drained?
        }
        None => context.run_jobs(),
    };
    drained.map_err(|e| describe(e, context))?;

    match promise.state() {
        PromiseState::Fulfilled(value) => Ok(value),
        PromiseState::Rejected(reason) => Err(describe(JsError::from_opaque(reason), context)),
        PromiseState::Pending => Err("routine promise never settled".to_string()),
    }
}

fn display(context: &mut Context, value: &JsValue) -> std::result::Result<String, String> {
    value
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
        .map_err(|e| describe(e, context))
}

/// Readable message for a script error; native errors keep their kind
fn describe(error: JsError, context: &mut Context) -> String {
    match error.try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => error.to_string(),
    }
}
