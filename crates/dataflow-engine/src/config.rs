//! Engine configuration
//!
//! Configuration is plain serde data so hosts can ship it as JSON next to
//! a project file or build it in code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::error::{EngineError, Result};

/// Settings that control how the engine runs a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Wall-clock limit for one routine invocation, in milliseconds
    pub invocation_timeout_ms: u64,
    /// Loop iteration limit applied by script engines that support one
    pub loop_iteration_limit: u64,
    /// Recursion limit applied by script engines that support one
    pub recursion_limit: usize,
    /// Copy inputs to outputs for nodes whose routine is blank
    pub passthrough_empty_routines: bool,
    /// Log every validation error at warn level before a run
    pub log_validation_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: defaults::INVOCATION_TIMEOUT_MS,
            loop_iteration_limit: defaults::LOOP_ITERATION_LIMIT,
            recursion_limit: defaults::RECURSION_LIMIT,
            passthrough_empty_routines: true,
            log_validation_errors: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Set the invocation timeout
    pub fn with_invocation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.invocation_timeout_ms = timeout_ms;
        self
    }

    /// Reject settings the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.invocation_timeout_ms == 0 {
            return Err(EngineError::Config(
                "invocationTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.loop_iteration_limit == 0 {
            return Err(EngineError::Config(
                "loopIterationLimit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
