//! Fluent builder for dataflow graphs
//!
//! Provides a fluent API for constructing graphs programmatically.

use serde_json::{Map, Value};

use crate::types::{DataflowGraph, GraphEdge, GraphNode};

/// Fluent builder for constructing dataflow graphs
///
/// An empty port string means "no handle": an empty source port binds the
/// whole upstream output, an empty target port spreads it into the inputs.
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new("g-1", "Profit")
///     .add_node("input-1", "data_input")
///     .with_config(serde_json::json!({"sampleData": "{\"cost\": 100}"}))
///     .add_node("calc-1", "profit_calculator")
///     .add_edge("input-1", "output", "calc-1", "cost")
///     .build();
/// ```
pub struct GraphBuilder {
    id: String,
    name: String,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    globals: Map<String, Value>,
    edge_counter: usize,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            globals: Map::new(),
            edge_counter: 0,
        }
    }

    /// Add a node to the graph
    pub fn add_node(mut self, id: impl Into<String>, module_id: impl Into<String>) -> Self {
        self.nodes.push(GraphNode::new(id, module_id));
        self
    }

    /// Set config on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_config(mut self, config: Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.config = config;
        }
        self
    }

    /// Override the routine of the most recently added node
    pub fn with_routine(mut self, routine: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.routine = Some(routine.into());
        }
        self
    }

    /// Pin the output of the most recently added node
    pub fn with_pinned(mut self, output: Value) -> Self {
        if let (Some(node), Value::Object(map)) = (self.nodes.last_mut(), output) {
            node.pinned_data = Some(map);
        }
        self
    }

    /// Set a session-level global
    pub fn with_global(mut self, key: impl Into<String>, value: Value) -> Self {
        self.globals.insert(key.into(), value);
        self
    }

    /// Add an edge between two nodes (auto-generates edge ID)
    pub fn add_edge(
        mut self,
        source: impl Into<String>,
        source_port: &str,
        target: impl Into<String>,
        target_port: &str,
    ) -> Self {
        self.edge_counter += 1;
        let id = format!("edge-{}", self.edge_counter);
        self.edges.push(make_edge(id, source, source_port, target, target_port));
        self
    }

    /// Add an edge with an explicit ID
    pub fn add_edge_with_id(
        mut self,
        edge_id: impl Into<String>,
        source: impl Into<String>,
        source_port: &str,
        target: impl Into<String>,
        target_port: &str,
    ) -> Self {
        self.edges
            .push(make_edge(edge_id.into(), source, source_port, target, target_port));
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> DataflowGraph {
        let mut graph = DataflowGraph::new(self.id, self.name);
        graph.nodes = self.nodes;
        graph.edges = self.edges;
        graph.globals = self.globals;
        graph
    }
}

fn make_edge(
    id: String,
    source: impl Into<String>,
    source_port: &str,
    target: impl Into<String>,
    target_port: &str,
) -> GraphEdge {
    GraphEdge::new(id, source, handle(source_port), target, handle(target_port))
}

fn handle(port: &str) -> Option<&str> {
    (!port.is_empty()).then_some(port)
}
