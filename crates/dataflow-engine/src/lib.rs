//! Dataflow Engine - graph execution for visual programming editors
//!
//! A graph is a set of nodes, each an instance of a registered module, and
//! the edges that wire output ports to input ports. The engine runs the
//! graph in a deterministic topological order, feeding every node the
//! results of its upstream nodes:
//!
//! - Validation that reports problems instead of failing the run
//! - Kahn scheduling with ascending-id tie breaks and cycle isolation
//! - Smart extraction of wrapped values between ports
//! - Routines compiled through a pluggable [`ScriptEngine`] (JavaScript on
//!   boa, or native Rust closures)
//! - Incremental re-runs of the dirty closure after an edit
//!
//! # Architecture
//!
//! - `DataflowEngine`: owns the registry, invoker and result store
//! - `EditorSession`: graph plus engine, tracks dirty nodes on edits
//! - `RunControl`: shared revision counter and cancel flag
//! - `EventSink`: generic event streaming (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dataflow_engine::{BoaScriptEngine, DataflowEngine, EngineConfig, GraphBuilder, ModuleRegistry};
//!
//! let graph = GraphBuilder::new("g-1", "Profit")
//!     .add_node("input-1", "data_input")
//!     .with_config(serde_json::json!({"sampleData": "{\"cost\": 100}"}))
//!     .add_node("calc-1", "profit_calculator")
//!     .add_edge("input-1", "output", "calc-1", "cost")
//!     .build();
//!
//! let config = EngineConfig::default();
//! let scripts = Arc::new(BoaScriptEngine::new(&config));
//! let mut engine = DataflowEngine::new(ModuleRegistry::with_presets(), scripts, config);
//! let report = engine.run(&graph).await;
//! ```

pub mod builder;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod invoker;
pub mod presets;
pub mod registry;
pub mod resolver;
pub mod results;
pub mod scheduler;
pub mod script;
pub mod session;
pub mod structure;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::GraphBuilder;
pub use config::EngineConfig;
pub use engine::{DataflowEngine, RunControl, RunReport, RunStatus};
pub use error::{EngineError, Result};
pub use events::{ChannelEventSink, DataflowEvent, EventError, EventSink, NullEventSink, VecEventSink};
pub use registry::ModuleRegistry;
pub use results::{ExecutionResult, ResultStore};
pub use script::{BoaScriptEngine, CompiledRoutine, InvocationMode, NativeScriptEngine, ScriptEngine};
pub use session::EditorSession;
pub use structure::ValueStructure;
pub use types::{
    DataflowGraph, GraphEdge, GraphNode, ModuleCategory, ModuleDefinition, NodeId, PortDefinition, PortType,
    PortValues, RunMode,
};
pub use validation::{validate, ValidationError, ValidationReport};
