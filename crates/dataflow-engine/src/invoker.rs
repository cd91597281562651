//! Node invocation
//!
//! Turns one node plus its resolved inputs into an output record:
//!
//! 1. Pinned nodes return their pinned output without running anything.
//! 2. The node's routine override, or else the module routine, is chosen.
//! 3. Blank routines pass their inputs through unchanged.
//! 4. Anything else is compiled (once per distinct source text) and invoked
//!    under the configured timeout. In per-item mode an array on `default`
//!    is fed to the routine one `{default: item}` at a time and the raw
//!    results are collected into `{default: [...]}`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::constants::routine::DEFAULT_PORT;
use crate::error::{EngineError, Result};
use crate::script::{is_empty_routine, CompiledRoutine, ScriptEngine};
use crate::types::{GraphNode, ModuleDefinition, PortValues, RunMode};

/// Compiles and runs node routines
pub struct Invoker {
    engine: Arc<dyn ScriptEngine>,
    cache: HashMap<String, Arc<dyn CompiledRoutine>>,
    timeout_ms: u64,
    passthrough_empty: bool,
}

impl Invoker {
    pub fn new(engine: Arc<dyn ScriptEngine>, config: &EngineConfig) -> Self {
        Self {
            engine,
            cache: HashMap::new(),
            timeout_ms: config.invocation_timeout_ms,
            passthrough_empty: config.passthrough_empty_routines,
        }
    }

    /// Compile a routine, reusing an earlier compilation of the same text
    pub fn compile(&mut self, source: &str) -> Result<Arc<dyn CompiledRoutine>> {
        if let Some(routine) = self.cache.get(source) {
            return Ok(Arc::clone(routine));
        }
        log::debug!("Compiling routine with {} engine", self.engine.name());
        let routine = self.engine.compile(source)?;
        self.cache.insert(source.to_string(), Arc::clone(&routine));
        Ok(routine)
    }

    /// Number of cached compiled routines
    pub fn cached_routines(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Produce the output record of one node
    ///
    /// `module` is `None` when the node's module is not registered.
    pub async fn invoke_node(
        &mut self,
        node: &GraphNode,
        module: Option<&ModuleDefinition>,
        inputs: PortValues,
        globals: &PortValues,
    ) -> Result<PortValues> {
        if let Some(pinned) = &node.pinned_data {
            log::debug!("Node '{}' is pinned, skipping invocation", node.id);
            return Ok(pinned.clone());
        }

        let module = module.ok_or_else(|| EngineError::ModuleNotFound(node.module_id.clone()))?;
        let source = node.routine.as_deref().unwrap_or(&module.routine);

        if self.passthrough_empty && is_empty_routine(source) {
            return Ok(inputs);
        }

        let routine = self.compile(source)?;
        let config = effective_config(&module.config, &node.config);

        match (module.run_mode, inputs.get(DEFAULT_PORT)) {
            (RunMode::Each, Some(Value::Array(items))) => {
                let mut outputs = Vec::with_capacity(items.len());
                for item in items {
                    let mut item_inputs = PortValues::new();
                    item_inputs.insert(DEFAULT_PORT.to_string(), item.clone());
                    outputs.push(self.call_raw(routine.as_ref(), &item_inputs, &config, globals).await?);
                }
                let mut collected = PortValues::new();
                collected.insert(DEFAULT_PORT.to_string(), Value::Array(outputs));
                Ok(collected)
            }
            _ => self.call(routine.as_ref(), &inputs, &config, globals).await,
        }
    }

    async fn call(
        &self,
        routine: &dyn CompiledRoutine,
        inputs: &PortValues,
        config: &Value,
        globals: &PortValues,
    ) -> Result<PortValues> {
        output_record(self.call_raw(routine, inputs, config, globals).await?)
    }

    async fn call_raw(
        &self,
        routine: &dyn CompiledRoutine,
        inputs: &PortValues,
        config: &Value,
        globals: &PortValues,
    ) -> Result<Value> {
        let timeout = Duration::from_millis(self.timeout_ms);
        tokio::time::timeout(timeout, routine.invoke(inputs, config, globals))
            .await
            .map_err(|_| EngineError::Timeout(self.timeout_ms))?
    }
}

/// Module defaults overlaid with the node's own config
///
/// A node config that is not an object replaces the defaults outright.
fn effective_config(defaults: &Value, node: &Value) -> Value {
    match (defaults, node) {
        (Value::Object(base), Value::Object(overrides)) => {
            let mut merged = base.clone();
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => node.clone(),
    }
}

/// Interpret a routine result as an output record
fn output_record(value: Value) -> Result<PortValues> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(PortValues::new()),
        Value::Array(_) => Err(EngineError::InvalidOutput("array".to_string())),
        Value::String(kind) if kind == "function" || kind == "symbol" || kind == "bigint" => {
            Err(EngineError::InvalidOutput(kind))
        }
        Value::String(_) => Err(EngineError::InvalidOutput("string".to_string())),
        Value::Number(_) => Err(EngineError::InvalidOutput("number".to_string())),
        Value::Bool(_) => Err(EngineError::InvalidOutput("boolean".to_string())),
    }
}
