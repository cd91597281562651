//! Editor session
//!
//! Wraps a graph and its engine. Every edit marks the nodes whose results
//! it invalidates as dirty and bumps the run revision, so an in-flight run
//! over the old graph is abandoned. [`EditorSession::execute_dirty`] then
//! re-runs exactly the dirty nodes and everything downstream of them.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::engine::{DataflowEngine, RunReport};
use crate::results::ResultStore;
use crate::types::{DataflowGraph, GraphEdge, GraphNode, ModuleDefinition, NodeId, PortValues};

/// A graph being edited, with its engine and dirty set
pub struct EditorSession {
    graph: DataflowGraph,
    engine: DataflowEngine,
    dirty: BTreeSet<NodeId>,
}

impl EditorSession {
    /// Start a session; every node is dirty until it first runs
    pub fn new(graph: DataflowGraph, engine: DataflowEngine) -> Self {
        let dirty = graph.nodes.iter().map(|n| n.id.clone()).collect();
        Self { graph, engine, dirty }
    }

    pub fn graph(&self) -> &DataflowGraph {
        &self.graph
    }

    pub fn engine(&self) -> &DataflowEngine {
        &self.engine
    }

    pub fn results(&self) -> &ResultStore {
        self.engine.results()
    }

    /// Nodes waiting to be re-run, sorted
    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.dirty.iter().cloned().collect()
    }

    pub fn is_dirty(&self, node_id: &str) -> bool {
        self.dirty.contains(node_id)
    }

    pub fn add_node(&mut self, node: GraphNode) {
        self.touch(&node.id);
        self.graph.add_node(node);
    }

    /// Delete a node, its edges and its result
    ///
    /// Former dependents become dirty because their inputs disappeared.
    pub fn remove_node(&mut self, node_id: &str) -> Option<GraphNode> {
        let dependents = self.graph.dependents(node_id);
        let removed = self.graph.remove_node(node_id)?;
        self.engine.remove_node_result(node_id);
        self.dirty.remove(node_id);
        for id in dependents {
            self.dirty.insert(id);
        }
        self.engine.control().bump_revision();
        Some(removed)
    }

    pub fn add_edge(&mut self, edge: GraphEdge) {
        self.touch(&edge.target);
        self.graph.add_edge(edge);
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Option<GraphEdge> {
        let edge = self.graph.remove_edge(edge_id)?;
        self.touch(&edge.target);
        Some(edge)
    }

    /// Replace a node's config; returns false for an unknown node
    pub fn update_node_config(&mut self, node_id: &str, config: Value) -> bool {
        self.edit_node(node_id, |node| node.config = config)
    }

    /// Set or clear a node's routine override
    pub fn set_node_routine(&mut self, node_id: &str, routine: Option<String>) -> bool {
        self.edit_node(node_id, |node| node.routine = routine)
    }

    /// Pin or unpin a node's output
    pub fn pin_node(&mut self, node_id: &str, output: Option<PortValues>) -> bool {
        self.edit_node(node_id, |node| node.pinned_data = output)
    }

    /// Set a global; every node sees globals, so every node becomes dirty
    pub fn set_global(&mut self, key: impl Into<String>, value: Value) {
        self.graph.globals.insert(key.into(), value);
        self.mark_all_dirty();
    }

    /// Register or replace a module; nodes instantiating it become dirty
    pub fn register_module(&mut self, module: ModuleDefinition) {
        let affected: Vec<NodeId> = self
            .graph
            .nodes
            .iter()
            .filter(|n| n.module_id == module.id)
            .map(|n| n.id.clone())
            .collect();
        self.engine.register_module(module);
        for id in &affected {
            self.touch(id);
        }
    }

    /// Re-run the dirty nodes and their downstream closure
    ///
    /// The dirty set is cleared only when the run completes.
    pub async fn execute_dirty(&mut self) -> RunReport {
        let changed = self.dirty_nodes();
        let report = self.engine.run_incremental(&self.graph, &changed).await;
        if report.is_complete() {
            self.dirty.clear();
        }
        report
    }

    /// Run the whole graph
    pub async fn execute_all(&mut self) -> RunReport {
        let report = self.engine.run(&self.graph).await;
        if report.is_complete() {
            self.dirty.clear();
        }
        report
    }

    /// Drop every result; every node becomes dirty
    pub fn reset(&mut self) {
        self.engine.reset();
        self.mark_all_dirty();
    }

    /// Take back the graph and engine
    pub fn into_parts(self) -> (DataflowGraph, DataflowEngine) {
        (self.graph, self.engine)
    }

    fn edit_node(&mut self, node_id: &str, edit: impl FnOnce(&mut GraphNode)) -> bool {
        let Some(node) = self.graph.find_node_mut(node_id) else {
            return false;
        };
        edit(node);
        self.touch(node_id);
        true
    }

    fn touch(&mut self, node_id: &str) {
        self.dirty.insert(node_id.to_string());
        self.engine.control().bump_revision();
    }

    fn mark_all_dirty(&mut self) {
        self.dirty = self.graph.nodes.iter().map(|n| n.id.clone()).collect();
        self.engine.control().bump_revision();
    }
}
