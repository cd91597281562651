//! Host-provided routines
//!
//! A native routine is referenced from a module by the source text
//! `native:<name>`. Any other source is handed to the fallback engine, so
//! a host can mix Rust routines with scripted ones:
//!
//! ```ignore
//! let engine = NativeScriptEngine::new()
//!     .with_routine("sum", |inputs, _config, _globals| { ... })
//!     .with_fallback(Arc::new(BoaScriptEngine::default()));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{CompiledRoutine, ScriptEngine};
use crate::error::{EngineError, Result};
use crate::types::PortValues;

/// Source prefix that names a native routine
pub const NATIVE_PREFIX: &str = "native:";

/// Signature of a native routine
pub type NativeFn = dyn Fn(&PortValues, &Value, &PortValues) -> Result<Value> + Send + Sync;

/// Script engine backed by registered Rust closures
#[derive(Default)]
pub struct NativeScriptEngine {
    routines: HashMap<String, Arc<NativeFn>>,
    fallback: Option<Arc<dyn ScriptEngine>>,
}

impl NativeScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine under a name, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, routine: F)
    where
        F: Fn(&PortValues, &Value, &PortValues) -> Result<Value> + Send + Sync + 'static,
    {
        self.routines.insert(name.into(), Arc::new(routine));
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_routine<F>(mut self, name: impl Into<String>, routine: F) -> Self
    where
        F: Fn(&PortValues, &Value, &PortValues) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, routine);
        self
    }

    /// Engine used for sources that are not native references
    pub fn with_fallback(mut self, fallback: Arc<dyn ScriptEngine>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Source text that refers to a native routine
    pub fn reference(name: &str) -> String {
        format!("{}{}", NATIVE_PREFIX, name)
    }
}

impl ScriptEngine for NativeScriptEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledRoutine>> {
        match source.trim().strip_prefix(NATIVE_PREFIX) {
            Some(name) => {
                let routine = self.routines.get(name.trim()).ok_or_else(|| {
                    EngineError::compilation(format!("no native routine named '{}'", name.trim()))
                })?;
                Ok(Arc::new(NativeRoutine(Arc::clone(routine))))
            }
            None => match &self.fallback {
                Some(fallback) => fallback.compile(source),
                None => Err(EngineError::compilation(format!(
                    "routine is not a '{}' reference and no fallback engine is set",
                    NATIVE_PREFIX
                ))),
            },
        }
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

struct NativeRoutine(Arc<NativeFn>);

#[async_trait]
impl CompiledRoutine for NativeRoutine {
    async fn invoke(&self, inputs: &PortValues, config: &Value, globals: &PortValues) -> Result<Value> {
        (self.0)(inputs, config, globals)
    }
}
