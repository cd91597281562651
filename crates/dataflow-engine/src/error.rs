//! Error types for the dataflow engine

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the dataflow engine
///
/// None of these escape a graph run: the engine converts them into a
/// failed [`ExecutionResult`](crate::results::ExecutionResult) for the
/// node that produced them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Node references a module that is not registered
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// Routine source failed to compile
    #[error("compilation failed: {0}")]
    Compilation(String),

    /// Routine threw while running
    #[error("{0}")]
    Invocation(String),

    /// Routine did not finish in time
    #[error("execution timed out after {0}ms")]
    Timeout(u64),

    /// Routine returned something other than an object keyed by port id
    #[error("routine must return an object keyed by output port ids, got {0}")]
    InvalidOutput(String),

    /// Node is part of a dependency cycle
    #[error("cycle detected")]
    CycleDetected,

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create an invocation error with a message
    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation(msg.into())
    }

    /// Create a compilation error with a message
    pub fn compilation(msg: impl Into<String>) -> Self {
        Self::Compilation(msg.into())
    }
}
