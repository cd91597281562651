//! Routine compilation capability
//!
//! A [`ScriptEngine`] turns routine source text into a [`CompiledRoutine`]
//! the invoker can call. The engine is chosen by the host:
//!
//! - [`BoaScriptEngine`] runs JavaScript routines in an embedded,
//!   sandboxed interpreter.
//! - [`NativeScriptEngine`] maps routine names to Rust closures and can
//!   fall back to another engine for everything else.
//!
//! Under the default [`InvocationMode::CallExecute`] a compiled routine
//! always *calls* the `execute(inputs, config, globals)` function its
//! source defines. Compilation fails when the source does not define it.

mod boa;
mod native;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::routine::ENTRY_POINT;
use crate::error::Result;
use crate::types::PortValues;

pub use boa::BoaScriptEngine;
pub use native::{NativeFn, NativeScriptEngine, NATIVE_PREFIX};

/// A routine ready to be invoked
#[async_trait]
pub trait CompiledRoutine: Send + Sync {
    /// Run the routine once
    ///
    /// Returns the raw routine result. The invoker checks that it is an
    /// object keyed by output port ids.
    async fn invoke(&self, inputs: &PortValues, config: &Value, globals: &PortValues) -> Result<Value>;
}

/// Compiles routine source text
pub trait ScriptEngine: Send + Sync {
    /// Compile a routine, failing with [`EngineError::Compilation`](crate::EngineError::Compilation)
    /// when the source cannot become a callable routine
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledRoutine>>;

    /// Short engine name for logs
    fn name(&self) -> &'static str;
}

/// How routine source text is turned into a callable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvocationMode {
    /// The source defines `execute`; invoking the routine calls it
    #[default]
    CallExecute,
    /// The source is the routine body itself, with `inputs`, `config` and
    /// `globals` in scope. A body that only defines `execute` returns
    /// nothing.
    FunctionBody,
}

/// Check whether a routine has no effect beyond passing inputs through
///
/// True for blank source and for an `execute` definition whose body holds
/// nothing but whitespace and line comments.
pub fn is_empty_routine(source: &str) -> bool {
    let source = source.trim();
    if source.is_empty() {
        return true;
    }

    let Some(rest) = source.strip_prefix("function") else {
        return false;
    };
    let Some(rest) = rest.trim_start().strip_prefix(ENTRY_POINT) else {
        return false;
    };
    let Some(open) = rest.find('{') else {
        return false;
    };

    let (signature, body) = rest.split_at(open);
    let signature = signature.trim();
    if !signature.starts_with('(') || !signature.ends_with(')') {
        return false;
    }

    let Some(body) = body.strip_prefix('{').and_then(|b| b.strip_suffix('}')) else {
        return false;
    };
    body.lines()
        .map(|line| line.split("//").next().unwrap_or_default())
        .all(|line| line.trim().is_empty())
}
