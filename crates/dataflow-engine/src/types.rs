//! Core types for dataflow graphs
//!
//! These types define the structure of an editor session: module
//! definitions, the node instances placed from them, the edges that
//! connect node ports, and the session-level globals.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Unique identifier for a port
pub type PortId = String;

/// Unique identifier for a module
pub type ModuleId = String;

/// Output (or input) record keyed by port id
pub type PortValues = Map<String, Value>;

/// Semantic type hint of a port
///
/// Hints are shown by the editor; they never gate execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    /// Accepts any value
    #[default]
    Any,
    /// Numeric value
    Number,
    /// Text string
    String,
    /// Nested JSON data
    Json,
    /// Boolean value
    Boolean,
    /// List of values
    Array,
    /// Key/value record
    Object,
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Unique identifier for this port within its module
    pub id: PortId,
    /// Semantic type hint
    #[serde(default, alias = "type")]
    pub type_hint: PortType,
    /// Human-readable label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Description shown as a tooltip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PortDefinition {
    /// Create a port with a type hint
    pub fn new(id: impl Into<String>, type_hint: PortType) -> Self {
        Self {
            id: id.into(),
            type_hint,
            name: String::new(),
            description: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Category of a module, used for grouping in the editor palette
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleCategory {
    /// Data sources
    Input,
    /// Data transformation
    Processing,
    /// Numeric calculation
    Calculation,
    /// Data sinks
    Output,
    /// User-defined modules
    #[default]
    Custom,
}

/// How a routine is applied to its inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Invoke once with the whole input bag
    #[default]
    Once,
    /// Invoke once per item when the `default` input is an array
    Each,
}

/// Definition of a module: its ports and transformation routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDefinition {
    /// Unique module identifier (e.g., "profit_calculator")
    pub id: ModuleId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Description of what the module does
    #[serde(default)]
    pub description: String,
    /// Category for palette grouping
    #[serde(default)]
    pub category: ModuleCategory,
    /// Input port definitions, in display order
    #[serde(default)]
    pub inputs: Vec<PortDefinition>,
    /// Output port definitions, in display order
    #[serde(default)]
    pub outputs: Vec<PortDefinition>,
    /// Source text of the transformation routine
    #[serde(default, alias = "code")]
    pub routine: String,
    /// Default configuration copied into new nodes
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Routine application mode
    #[serde(default)]
    pub run_mode: RunMode,
}

impl ModuleDefinition {
    /// Create a module with a routine and no ports
    pub fn new(id: impl Into<String>, routine: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            category: ModuleCategory::Custom,
            inputs: Vec::new(),
            outputs: Vec::new(),
            routine: routine.into(),
            config: empty_object(),
            run_mode: RunMode::Once,
        }
    }

    /// Add an input port
    pub fn with_input(mut self, port: PortDefinition) -> Self {
        self.inputs.push(port);
        self
    }

    /// Add an output port
    pub fn with_output(mut self, port: PortDefinition) -> Self {
        self.outputs.push(port);
        self
    }

    /// Set the display name and description
    pub fn with_label(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.name = name.into();
        self.description = description.into();
        self
    }

    /// Set the category
    pub fn with_category(mut self, category: ModuleCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the default node configuration
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Set the run mode
    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    /// Check whether an input port is declared
    pub fn has_input(&self, port_id: &str) -> bool {
        self.inputs.iter().any(|p| p.id == port_id)
    }

    /// Check whether an output port is declared
    pub fn has_output(&self, port_id: &str) -> bool {
        self.outputs.iter().any(|p| p.id == port_id)
    }
}

/// A directed connection between two node ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Source port ID; absent means the whole output object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<PortId>,
    /// Target node ID
    pub target: NodeId,
    /// Target port ID; absent means spread the value into the inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<PortId>,
}

impl GraphEdge {
    /// Create an edge between two ports
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_handle: Option<&str>,
        target: impl Into<String>,
        target_handle: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_handle: source_handle.map(str::to_string),
            target: target.into(),
            target_handle: target_handle.map(str::to_string),
        }
    }

    /// Source port, treating an empty handle as absent
    pub fn source_port(&self) -> Option<&str> {
        self.source_handle.as_deref().filter(|h| !h.is_empty())
    }

    /// Target port, treating an empty handle as absent
    pub fn target_port(&self) -> Option<&str> {
        self.target_handle.as_deref().filter(|h| !h.is_empty())
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Module this node instantiates
    pub module_id: ModuleId,
    /// Per-instance configuration passed to the routine
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Routine override for this node only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine: Option<String>,
    /// Frozen output; a pinned node is never invoked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_data: Option<PortValues>,
}

impl GraphNode {
    /// Create a node with an empty configuration
    pub fn new(id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            module_id: module_id.into(),
            config: empty_object(),
            routine: None,
            pinned_data: None,
        }
    }

    /// Create a node whose configuration starts from the module defaults
    pub fn from_module(id: impl Into<String>, module: &ModuleDefinition) -> Self {
        let mut node = Self::new(id, module.id.clone());
        node.config = module.config.clone();
        node
    }
}

/// A complete dataflow graph (one editor session)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataflowGraph {
    /// Unique identifier for this graph
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Nodes in the graph
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Edges connecting nodes
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    /// Session-level values passed to every routine
    #[serde(default)]
    pub globals: Map<String, Value>,
}

impl DataflowGraph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.push(node);
    }

    /// Remove a node and every edge attached to it
    pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
        let pos = self.nodes.iter().position(|n| n.id == id)?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Some(self.nodes.remove(pos))
    }

    /// Add an edge to the graph
    pub fn add_edge(&mut self, edge: GraphEdge) {
        self.edges.push(edge);
    }

    /// Remove an edge by ID
    pub fn remove_edge(&mut self, id: &str) -> Option<GraphEdge> {
        let pos = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(pos))
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Get the IDs of nodes that this node depends on (upstream nodes)
    pub fn dependencies(&self, node_id: &str) -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = self.incoming_edges(node_id).map(|e| e.source.clone()).collect();
        deps.sort();
        deps.dedup();
        deps
    }

    /// Get the IDs of nodes that depend on this node (downstream nodes)
    pub fn dependents(&self, node_id: &str) -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = self.outgoing_edges(node_id).map(|e| e.target.clone()).collect();
        deps.sort();
        deps.dedup();
        deps
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}
