//! Graph execution engine
//!
//! A [`DataflowEngine`] owns a module registry, an invoker and the result
//! store of one editor session. A run:
//!
//! 1. validates the graph and drops invalid edges,
//! 2. schedules the nodes (a full run, or the dirty closure of the changed
//!    nodes for an incremental run),
//! 3. fails every cycle member with "cycle detected" without invoking it,
//! 4. resolves inputs and invokes each scheduled node in order.
//!
//! Node failures never abort a run. The only way a run stops early is
//! through its [`RunControl`]: when the graph revision moves or a cancel is
//! requested, the engine stops before the next node and flags the entries
//! written so far as stale.
//!
//! Engines share no state, so independent engines can coexist.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{DataflowEvent, EventSink, NullEventSink};
use crate::invoker::Invoker;
use crate::registry::ModuleRegistry;
use crate::resolver::resolve_inputs;
use crate::results::{ExecutionResult, ResultStore};
use crate::scheduler::{build_schedule, dirty_closure};
use crate::script::ScriptEngine;
use crate::types::{DataflowGraph, GraphEdge, ModuleDefinition, NodeId};
use crate::validation::{validate, ValidationError};

/// Shared handle for interrupting runs
///
/// The editor bumps the revision on every graph mutation. A run remembers
/// the revision it started at and is abandoned once it moves.
#[derive(Debug, Default)]
pub struct RunControl {
    revision: AtomicU64,
    cancelled: AtomicBool,
}

impl RunControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current graph revision
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Record a graph mutation, returning the new revision
    pub fn bump_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Ask the current run to stop before its next node
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn clear_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// Every scheduled node ran
    Completed,
    /// The graph changed while the run was in progress
    Abandoned,
    /// A cancel was requested
    Cancelled,
}

/// Summary of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub graph_id: String,
    pub status: RunStatus,
    /// Nodes that were executed, in execution order
    pub executed: Vec<NodeId>,
    /// Scheduled nodes that never ran because the run stopped early
    pub pending: Vec<NodeId>,
    /// Cycle members that were failed without running
    pub cyclic: Vec<NodeId>,
    /// Results written by this run
    pub patch: BTreeMap<NodeId, ExecutionResult>,
    pub validation_errors: Vec<ValidationError>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Number of successful results in the patch
    pub fn succeeded(&self) -> usize {
        self.patch.values().filter(|r| r.success).count()
    }

    /// Number of failed results in the patch
    pub fn failed(&self) -> usize {
        self.patch.values().filter(|r| !r.success).count()
    }
}

/// Executes dataflow graphs against a module registry
pub struct DataflowEngine {
    registry: ModuleRegistry,
    invoker: Invoker,
    results: ResultStore,
    config: EngineConfig,
    control: Arc<RunControl>,
    events: Arc<dyn EventSink>,
}

impl DataflowEngine {
    pub fn new(registry: ModuleRegistry, script_engine: Arc<dyn ScriptEngine>, config: EngineConfig) -> Self {
        Self {
            registry,
            invoker: Invoker::new(script_engine, &config),
            results: ResultStore::new(),
            config,
            control: RunControl::new(),
            events: Arc::new(NullEventSink),
        }
    }

    /// Send run events to `sink`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Use an existing control handle
    pub fn with_run_control(mut self, control: Arc<RunControl>) -> Self {
        self.control = control;
        self
    }

    /// Handle for interrupting runs from elsewhere
    pub fn control(&self) -> Arc<RunControl> {
        Arc::clone(&self.control)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Register or replace a module
    ///
    /// Compiled routines are cached by source text, so new source is
    /// compiled on its next use.
    pub fn register_module(&mut self, module: ModuleDefinition) -> Option<ModuleDefinition> {
        self.registry.register(module)
    }

    /// Results of the most recent run of each node
    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Drop the result of a deleted node
    pub fn remove_node_result(&mut self, node_id: &str) -> Option<ExecutionResult> {
        self.results.remove(node_id)
    }

    /// Clear all results and compiled routines
    pub fn reset(&mut self) {
        self.results.clear();
        self.invoker.clear_cache();
    }

    /// Run every node of the graph
    pub async fn run(&mut self, graph: &DataflowGraph) -> RunReport {
        self.execute(graph, None).await
    }

    /// Run the changed nodes and everything downstream of them
    pub async fn run_incremental(&mut self, graph: &DataflowGraph, changed: &[NodeId]) -> RunReport {
        self.execute(graph, Some(changed)).await
    }

    async fn execute(&mut self, graph: &DataflowGraph, changed: Option<&[NodeId]>) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let start_revision = self.control.revision();
        self.control.clear_cancel();

        let validation = validate(graph, &self.registry);
        if self.config.log_validation_errors {
            for error in &validation.errors {
                log::warn!("Graph '{}': {}", graph.id, error);
            }
        }

        let edges = validation.valid_edges(graph);
        let full = build_schedule(graph, &edges);
        let schedule = match changed {
            Some(changed) => full.restrict_to(&self.incremental_set(graph, &edges, changed)),
            None => full,
        };

        log::info!(
            "Run {} of graph '{}': {} nodes scheduled, {} on cycles",
            run_id,
            graph.id,
            schedule.order.len(),
            schedule.cyclic.len()
        );
        self.emit(DataflowEvent::RunStarted {
            graph_id: graph.id.clone(),
            run_id: run_id.clone(),
            nodes: schedule.order.iter().chain(&schedule.cyclic).cloned().collect(),
        });

        let mut report = RunReport {
            run_id: run_id.clone(),
            graph_id: graph.id.clone(),
            status: RunStatus::Completed,
            executed: Vec::new(),
            pending: Vec::new(),
            cyclic: schedule.cyclic.clone(),
            patch: BTreeMap::new(),
            validation_errors: validation.errors.clone(),
        };

        for node_id in &schedule.cyclic {
            let result = ExecutionResult::from(EngineError::CycleDetected);
            self.emit(DataflowEvent::NodeFailed {
                node_id: node_id.clone(),
                run_id: run_id.clone(),
                error: EngineError::CycleDetected.to_string(),
            });
            self.results.insert(node_id.clone(), result.clone());
            report.patch.insert(node_id.clone(), result);
        }

        for (position, node_id) in schedule.order.iter().enumerate() {
            if let Some(status) = self.interrupted(start_revision) {
                report.pending = schedule.order[position..].to_vec();
                return self.abandon(graph, report, status);
            }

            let Some(node) = graph.find_node(node_id) else {
                continue;
            };

            self.emit(DataflowEvent::NodeStarted {
                node_id: node_id.clone(),
                run_id: run_id.clone(),
            });

            let inputs = resolve_inputs(node_id, &edges, &self.results);
            let module = self.registry.get(&node.module_id);
            let started = Instant::now();
            let outcome = self
                .invoker
                .invoke_node(node, module, inputs, &graph.globals)
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(output) => {
                    if node.pinned_data.is_some() {
                        self.emit(DataflowEvent::NodeSkipped {
                            node_id: node_id.clone(),
                            run_id: run_id.clone(),
                            reason: "pinned".to_string(),
                        });
                    } else {
                        self.emit(DataflowEvent::NodeCompleted {
                            node_id: node_id.clone(),
                            run_id: run_id.clone(),
                            execution_time_ms: elapsed_ms,
                        });
                    }
                    ExecutionResult::success(output)
                }
                Err(e) => {
                    log::warn!("Node '{}' failed: {}", node_id, e);
                    self.emit(DataflowEvent::NodeFailed {
                        node_id: node_id.clone(),
                        run_id: run_id.clone(),
                        error: e.to_string(),
                    });
                    ExecutionResult::from(e)
                }
            }
            .with_execution_time(elapsed_ms);

            self.results.insert(node_id.clone(), result.clone());
            report.patch.insert(node_id.clone(), result);
            report.executed.push(node_id.clone());
        }

        if let Some(status) = self.interrupted(start_revision) {
            return self.abandon(graph, report, status);
        }

        log::info!(
            "Run {} completed: {} succeeded, {} failed",
            run_id,
            report.succeeded(),
            report.failed()
        );
        self.emit(DataflowEvent::RunCompleted {
            graph_id: graph.id.clone(),
            run_id,
            succeeded: report.succeeded(),
            failed: report.failed(),
        });
        report
    }

    /// Dirty closure of `changed`, widened by the stale entries upstream of it
    fn incremental_set(&self, graph: &DataflowGraph, edges: &[&GraphEdge], changed: &[NodeId]) -> BTreeSet<NodeId> {
        let dirty = dirty_closure(graph, edges, changed);
        let stale: Vec<NodeId> = self
            .results
            .stale_ids()
            .filter(|id| !dirty.contains(*id))
            .filter(|id| {
                dirty_closure(graph, edges, std::slice::from_ref(*id))
                    .iter()
                    .any(|reached| dirty.contains(reached))
            })
            .cloned()
            .collect();
        if stale.is_empty() {
            return dirty;
        }

        log::debug!("Re-running stale upstream nodes: {:?}", stale);
        let mut seeds = changed.to_vec();
        seeds.extend(stale);
        dirty_closure(graph, edges, &seeds)
    }

    fn interrupted(&self, start_revision: u64) -> Option<RunStatus> {
        if self.control.is_cancelled() {
            Some(RunStatus::Cancelled)
        } else if self.control.revision() != start_revision {
            Some(RunStatus::Abandoned)
        } else {
            None
        }
    }

    fn abandon(&mut self, graph: &DataflowGraph, mut report: RunReport, status: RunStatus) -> RunReport {
        self.results.mark_stale(report.patch.keys());
        let reason = match status {
            RunStatus::Cancelled => "cancelled",
            _ => "graph changed",
        };
        log::info!(
            "Run {} {}: {} nodes ran, {} pending",
            report.run_id,
            reason,
            report.executed.len(),
            report.pending.len()
        );
        self.emit(DataflowEvent::RunAbandoned {
            graph_id: graph.id.clone(),
            run_id: report.run_id.clone(),
            reason: reason.to_string(),
        });
        report.status = status;
        report
    }

    fn emit(&self, event: DataflowEvent) {
        if let Err(e) = self.events.send(event) {
            log::debug!("Dropped run event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::events::VecEventSink;
    use crate::script::{BoaScriptEngine, InvocationMode, NativeScriptEngine};
    use crate::types::{PortDefinition, PortType};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Registry where every module takes `in` and produces `out`
    fn registry(routines: &[(&str, &str)]) -> ModuleRegistry {
        routines
            .iter()
            .map(|(id, routine)| {
                ModuleDefinition::new(*id, *routine)
                    .with_input(PortDefinition::new("in", PortType::Any))
                    .with_output(PortDefinition::new("out", PortType::Any))
            })
            .collect()
    }

    fn js_engine(registry: ModuleRegistry) -> DataflowEngine {
        DataflowEngine::new(registry, Arc::new(BoaScriptEngine::default()), EngineConfig::default())
    }

    fn output_of<'a>(engine: &'a DataflowEngine, node_id: &str) -> &'a serde_json::Map<String, Value> {
        engine
            .results()
            .get(node_id)
            .and_then(|r| r.successful_output())
            .unwrap_or_else(|| panic!("no successful output for {}", node_id))
    }

    fn profit_graph() -> DataflowGraph {
        GraphBuilder::new("g-profit", "Profit")
            .add_node("input-1", "data_input")
            .with_config(json!({"sampleData": "{\"cost\": 100, \"price\": 150, \"quantity\": 2}"}))
            .add_node("calc-1", "profit_calculator")
            .add_node("out-1", "data_output")
            .add_edge("input-1", "output", "calc-1", "cost")
            .add_edge("input-1", "output", "calc-1", "price")
            .add_edge("input-1", "output", "calc-1", "quantity")
            .add_edge("calc-1", "profit", "out-1", "input")
            .build()
    }

    #[tokio::test]
    async fn test_preset_pipeline() {
        let mut engine = js_engine(ModuleRegistry::with_presets());
        let report = engine.run(&profit_graph()).await;

        assert!(report.is_complete());
        assert_eq!(report.executed, vec!["input-1", "calc-1", "out-1"]);
        assert_eq!(output_of(&engine, "calc-1")["profit"], json!(100));
        assert_eq!(output_of(&engine, "calc-1")["revenue"], json!(300));
        assert_eq!(output_of(&engine, "out-1")["input"], json!(100));
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_runs_are_deterministic() {
        let graph = profit_graph();
        let mut first = js_engine(ModuleRegistry::with_presets());
        let mut second = js_engine(ModuleRegistry::with_presets());

        let a = first.run(&graph).await;
        let b = second.run(&graph).await;

        assert_eq!(a.executed, b.executed);
        for (id, result) in &a.patch {
            let other = &b.patch[id];
            assert_eq!(result.output, other.output);
            assert_eq!(result.error, other.error);
        }
    }

    #[tokio::test]
    async fn test_invocation_contract_pair() {
        let graph = GraphBuilder::new("g", "Pair")
            .add_node("a", "source")
            .add_node("b", "echo")
            .add_edge("a", "out", "b", "cost")
            .build();
        let mut modules = registry(&[
            ("source", "function execute() { return { out: { cost: 100 } }; }"),
            ("echo", "function execute(inputs, config, globals) { return { out: inputs }; }"),
        ]);
        if let Some(echo) = modules.remove("echo") {
            modules.register(echo.with_input(PortDefinition::new("cost", PortType::Number)));
        }

        let edges: Vec<&GraphEdge> = graph.edges.iter().collect();

        // The source is compiled as the routine body, so execute is never called
        let without = BoaScriptEngine::default().with_mode(InvocationMode::FunctionBody);
        let mut engine = DataflowEngine::new(modules.clone(), Arc::new(without), EngineConfig::default());
        engine.run(&graph).await;
        assert!(output_of(&engine, "a").is_empty());
        assert!(resolve_inputs("b", &edges, engine.results()).is_empty());

        let mut engine = js_engine(modules);
        engine.run(&graph).await;
        let inputs = resolve_inputs("b", &edges, engine.results());
        assert_eq!(Value::Object(inputs), json!({"cost": 100}));
        assert_eq!(output_of(&engine, "b")["out"], json!({"cost": 100}));
    }

    #[tokio::test]
    async fn test_async_routine_output_is_awaited() {
        let graph = GraphBuilder::new("g", "Async").add_node("a", "fetch").build();
        let modules = registry(&[(
            "fetch",
            "async function execute() { const out = await Promise.resolve(42); return { out }; }",
        )]);
        let mut engine = js_engine(modules);

        let report = engine.run(&graph).await;
        assert_eq!(report.failed(), 0);
        assert_eq!(output_of(&engine, "a")["out"], json!(42));
    }

    #[tokio::test]
    async fn test_rejected_async_routine_fails_node() {
        let graph = GraphBuilder::new("g", "Async").add_node("a", "fetch").build();
        let modules = registry(&[(
            "fetch",
            "async function execute() { throw new Error('quota exceeded'); }",
        )]);
        let mut engine = js_engine(modules);

        engine.run(&graph).await;
        let result = engine.results().get("a").unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_cycle_isolation() {
        let graph = GraphBuilder::new("g", "Cycle")
            .add_node("a", "pass")
            .add_node("b", "pass")
            .add_node("c", "pass")
            .add_node("free", "const")
            .add_edge("a", "out", "b", "in")
            .add_edge("b", "out", "a", "in")
            .add_edge("b", "out", "c", "in")
            .build();
        let invoked = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&invoked);
        let native = NativeScriptEngine::new()
            .with_routine("pass", move |inputs, _, _| {
                seen.lock().unwrap().push(inputs.clone());
                Ok(json!({"out": inputs.get("in").cloned().unwrap_or(json!("none"))}))
            })
            .with_routine("const", |_, _, _| Ok(json!({"out": 1})));
        let modules = registry(&[("pass", "native:pass"), ("const", "native:const")]);
        let mut engine = DataflowEngine::new(modules, Arc::new(native), EngineConfig::default());

        let report = engine.run(&graph).await;

        assert!(report.is_complete());
        assert_eq!(report.cyclic, vec!["a", "b"]);
        for id in ["a", "b"] {
            let result = engine.results().get(id).unwrap();
            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some("cycle detected"));
        }
        assert_eq!(output_of(&engine, "free")["out"], json!(1));
        // Downstream of the cycle runs with its input absent
        assert_eq!(output_of(&engine, "c")["out"], json!("none"));
        assert_eq!(invoked.lock().unwrap().len(), 1);
        assert_eq!(report.validation_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_downstream_input_absent() {
        let graph = GraphBuilder::new("g", "Failure")
            .add_node("a", "broken")
            .add_node("b", "report")
            .add_edge("a", "out", "b", "in")
            .build();
        let modules = registry(&[
            ("broken", "function execute() { throw new Error('upstream exploded'); }"),
            ("report", "function execute(inputs) { return { out: 'in' in inputs }; }"),
        ]);
        let mut engine = js_engine(modules);

        let report = engine.run(&graph).await;

        let failed = engine.results().get("a").unwrap();
        assert!(!failed.success);
        assert!(failed.error.as_deref().unwrap().contains("upstream exploded"));
        assert_eq!(output_of(&engine, "b")["out"], json!(false));
        assert_eq!((report.succeeded(), report.failed()), (1, 1));
    }

    #[tokio::test]
    async fn test_unknown_module_and_bad_edge() {
        let graph = GraphBuilder::new("g", "Bad")
            .add_node("a", "const")
            .add_node("ghost", "not_registered")
            .add_node("b", "pass")
            .add_edge("a", "wrong_port", "b", "in")
            .build();
        let native = NativeScriptEngine::new()
            .with_routine("const", |_, _, _| Ok(json!({"out": 1})))
            .with_routine("pass", |inputs, _, _| Ok(json!({"out": inputs.len()})));
        let modules = registry(&[("const", "native:const"), ("pass", "native:pass")]);
        let mut engine = DataflowEngine::new(modules, Arc::new(native), EngineConfig::default());

        let report = engine.run(&graph).await;

        assert_eq!(
            engine.results().get("ghost").unwrap().error.as_deref(),
            Some("module not found: not_registered")
        );
        assert_eq!(output_of(&engine, "b")["out"], json!(0));
        assert_eq!(report.validation_errors.len(), 2);
    }

    #[tokio::test]
    async fn test_incremental_run_touches_only_dirty_closure() {
        let graph = GraphBuilder::new("g", "Chain")
            .add_node("a", "const")
            .add_node("b", "pass")
            .add_node("c", "pass")
            .add_edge("a", "out", "b", "in")
            .add_edge("b", "out", "c", "in")
            .build();
        let native = NativeScriptEngine::new()
            .with_routine("const", |_, config, _| Ok(json!({"out": config.get("v").cloned().unwrap_or(json!(0))})))
            .with_routine("pass", |inputs, _, _| Ok(json!({"out": inputs.get("in").cloned()})));
        let modules = registry(&[("const", "native:const"), ("pass", "native:pass")]);
        let mut engine = DataflowEngine::new(modules, Arc::new(native), EngineConfig::default());

        engine.run(&graph).await;

        let leaf = engine.run_incremental(&graph, &["c".to_string()]).await;
        assert_eq!(leaf.executed, vec!["c"]);
        assert_eq!(leaf.patch.len(), 1);

        let mut edited = graph.clone();
        edited.find_node_mut("a").unwrap().config = json!({"v": 7});
        let root = engine.run_incremental(&edited, &["a".to_string()]).await;
        assert_eq!(root.executed, vec!["a", "b", "c"]);
        assert_eq!(output_of(&engine, "c")["out"], json!(7));
    }

    #[tokio::test]
    async fn test_revision_bump_abandons_run() {
        let control = RunControl::new();
        let bumper = Arc::clone(&control);
        let native = NativeScriptEngine::new()
            .with_routine("edit", move |_, _, _| {
                bumper.bump_revision();
                Ok(json!({"out": 1}))
            })
            .with_routine("const", |_, _, _| Ok(json!({"out": 2})));
        let graph = GraphBuilder::new("g", "Edit")
            .add_node("a", "edit")
            .add_node("b", "const")
            .build();
        let modules = registry(&[("edit", "native:edit"), ("const", "native:const")]);
        let sink = Arc::new(VecEventSink::new());
        let mut engine = DataflowEngine::new(modules, Arc::new(native), EngineConfig::default())
            .with_run_control(control)
            .with_event_sink(sink.clone());

        let report = engine.run(&graph).await;

        assert_eq!(report.status, RunStatus::Abandoned);
        assert_eq!(report.executed, vec!["a"]);
        assert_eq!(report.pending, vec!["b"]);
        assert!(engine.results().is_stale("a"));
        assert!(!engine.results().contains("b"));
        assert!(matches!(
            sink.events().last(),
            Some(DataflowEvent::RunAbandoned { reason, .. }) if reason == "graph changed"
        ));

        // A run that completes overwrites the stale entry
        let steady = GraphBuilder::new("g", "Edit").add_node("a", "const").build();
        let rerun = engine.run(&steady).await;
        assert!(rerun.is_complete());
        assert!(!engine.results().is_stale("a"));
        assert_eq!(output_of(&engine, "a")["out"], json!(2));
    }

    #[tokio::test]
    async fn test_incremental_run_reruns_stale_upstream() {
        let control = RunControl::new();
        let bumper = Arc::clone(&control);
        let edited = Arc::new(AtomicBool::new(false));
        let native = NativeScriptEngine::new()
            .with_routine("const", |_, _, _| Ok(json!({"out": 1})))
            .with_routine("add", move |inputs, _, _| {
                if !edited.swap(true, Ordering::SeqCst) {
                    bumper.bump_revision();
                }
                let x = inputs.get("in").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!({"out": x + 1}))
            })
            .with_routine("echo", |inputs, _, _| Ok(json!({"out": inputs.get("in").cloned()})));
        let graph = GraphBuilder::new("g", "Chain")
            .add_node("a", "const")
            .add_node("b", "add")
            .add_node("c", "echo")
            .add_edge("a", "out", "b", "in")
            .add_edge("b", "out", "c", "in")
            .build();
        let modules = registry(&[("const", "native:const"), ("add", "native:add"), ("echo", "native:echo")]);
        let mut engine = DataflowEngine::new(modules, Arc::new(native), EngineConfig::default())
            .with_run_control(control);

        let first = engine.run(&graph).await;
        assert_eq!(first.status, RunStatus::Abandoned);
        assert!(engine.results().is_stale("a"));
        assert!(engine.results().is_stale("b"));

        let report = engine.run_incremental(&graph, &["c".to_string()]).await;
        assert!(report.is_complete());
        assert_eq!(report.executed, vec!["a", "b", "c"]);
        assert_eq!(engine.results().stale_ids().count(), 0);
        assert_eq!(output_of(&engine, "c")["out"], json!(2));
    }

    #[tokio::test]
    async fn test_cancel_stops_run() {
        let control = RunControl::new();
        let canceller = Arc::clone(&control);
        let native = NativeScriptEngine::new().with_routine("stop", move |_, _, _| {
            canceller.cancel();
            Ok(json!({}))
        });
        let graph = GraphBuilder::new("g", "Cancel")
            .add_node("a", "stop")
            .add_node("b", "stop")
            .build();
        let mut engine = DataflowEngine::new(registry(&[("stop", "native:stop")]), Arc::new(native), EngineConfig::default())
            .with_run_control(control);

        let report = engine.run(&graph).await;
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.executed, vec!["a"]);

        // A new run clears the cancel flag
        let again = engine.run(&graph).await;
        assert_eq!(again.executed, vec!["a"]);
    }

    #[tokio::test]
    async fn test_events_follow_execution() {
        let sink = Arc::new(VecEventSink::new());
        let mut graph = profit_graph();
        graph.find_node_mut("input-1").unwrap().pinned_data =
            Some(serde_json::from_value(json!({"output": {"cost": 1, "price": 2, "quantity": 3}})).unwrap());
        let mut engine = js_engine(ModuleRegistry::with_presets()).with_event_sink(sink.clone());

        engine.run(&graph).await;

        let events = sink.events();
        assert!(matches!(events.first(), Some(DataflowEvent::RunStarted { nodes, .. }) if nodes.len() == 3));
        assert!(events.iter().any(|e| matches!(
            e,
            DataflowEvent::NodeSkipped { node_id, reason, .. } if node_id == "input-1" && reason == "pinned"
        )));
        assert!(matches!(
            events.last(),
            Some(DataflowEvent::RunCompleted { succeeded: 3, failed: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_run_survives_closed_event_channel() {
        let (sink, receiver) = crate::events::ChannelEventSink::new();
        drop(receiver);
        let mut engine = js_engine(ModuleRegistry::with_presets()).with_event_sink(Arc::new(sink));

        let report = engine.run(&profit_graph()).await;
        assert!(report.is_complete());
        assert_eq!(output_of(&engine, "calc-1")["profit"], json!(100));
    }

    #[tokio::test]
    async fn test_reset_and_remove() {
        let mut engine = js_engine(ModuleRegistry::with_presets());
        engine.run(&profit_graph()).await;
        assert_eq!(engine.results().len(), 3);

        assert!(engine.remove_node_result("out-1").is_some());
        assert_eq!(engine.results().len(), 2);

        engine.reset();
        assert!(engine.results().is_empty());
    }

    #[tokio::test]
    async fn test_reregistered_module_recompiles() {
        let graph = GraphBuilder::new("g", "Live edit").add_node("a", "m").build();
        let mut engine = js_engine(registry(&[("m", "function execute() { return { out: 1 }; }")]));
        engine.run(&graph).await;
        assert_eq!(output_of(&engine, "a")["out"], json!(1));

        engine.register_module(ModuleDefinition::new("m", "function execute() { return { out: 2 }; }"));
        engine.run(&graph).await;
        assert_eq!(output_of(&engine, "a")["out"], json!(2));
    }
}
