//! Graph validation
//!
//! Validates graph structure against the module registry. Nothing found
//! here is fatal: invalid edges are excluded from resolution and
//! scheduling, unknown modules fail only their own node, and cycles are
//! isolated by the scheduler.

use std::collections::HashSet;

use crate::registry::ModuleRegistry;
use crate::scheduler;
use crate::types::{DataflowGraph, EdgeId, GraphEdge, NodeId};

/// Which end of an edge a port belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSide {
    Source,
    Target,
}

impl std::fmt::Display for PortSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "output"),
            Self::Target => write!(f, "input"),
        }
    }
}

/// Validation error with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two nodes share an id
    DuplicateNode { node_id: NodeId },
    /// A node references a module that is not registered
    UnknownModule { node_id: NodeId, module_id: String },
    /// An edge references a non-existent node
    UnknownNode { edge_id: EdgeId, node_id: NodeId },
    /// An edge names a port the node's module does not declare
    UnknownPort {
        edge_id: EdgeId,
        node_id: NodeId,
        port_id: String,
        side: PortSide,
    },
    /// A dependency cycle, listing its members
    CycleDetected { node_ids: Vec<NodeId> },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownModule { node_id, module_id } => {
                write!(f, "Unknown module '{}' for node '{}'", module_id, node_id)
            }
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::UnknownPort {
                edge_id,
                node_id,
                port_id,
                side,
            } => {
                write!(
                    f,
                    "Edge '{}' references unknown {} port '{}' on node '{}'",
                    edge_id, side, port_id, node_id
                )
            }
            Self::CycleDetected { node_ids } => {
                write!(f, "Cycle detected between nodes: {}", node_ids.join(", "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Outcome of validating a graph
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Every problem found, not just the first
    pub errors: Vec<ValidationError>,
    invalid_edges: HashSet<EdgeId>,
}

impl ValidationReport {
    /// Check whether the graph has no problems at all
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Check whether an edge may be used for resolution and scheduling
    pub fn is_edge_valid(&self, edge_id: &str) -> bool {
        !self.invalid_edges.contains(edge_id)
    }

    /// Edges of `graph` that passed validation, in graph order
    pub fn valid_edges<'g>(&self, graph: &'g DataflowGraph) -> Vec<&'g GraphEdge> {
        graph
            .edges
            .iter()
            .filter(|e| self.is_edge_valid(&e.id))
            .collect()
    }

    /// Ids of the excluded edges, sorted
    pub fn invalid_edge_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.invalid_edges.iter().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Cycle errors only
    pub fn cycles(&self) -> impl Iterator<Item = &[NodeId]> {
        self.errors.iter().filter_map(|e| match e {
            ValidationError::CycleDetected { node_ids } => Some(node_ids.as_slice()),
            _ => None,
        })
    }
}

/// Validate a graph against a registry
///
/// Returns all validation errors found (not just the first).
pub fn validate(graph: &DataflowGraph, registry: &ModuleRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_nodes(graph, registry, &mut report);
    validate_edges(graph, registry, &mut report);

    let edges = report.valid_edges(graph);
    for node_ids in scheduler::find_cycles(graph, &edges) {
        report.errors.push(ValidationError::CycleDetected { node_ids });
    }

    report
}

/// Check node ids are unique and their modules are registered
fn validate_nodes(graph: &DataflowGraph, registry: &ModuleRegistry, report: &mut ValidationReport) {
    let mut seen: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            report.errors.push(ValidationError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
        if !registry.contains(&node.module_id) {
            report.errors.push(ValidationError::UnknownModule {
                node_id: node.id.clone(),
                module_id: node.module_id.clone(),
            });
        }
    }
}

/// Check that edge endpoints exist and name declared ports
///
/// Ports on a node whose module is unknown cannot be checked; the node
/// already fails on its own.
fn validate_edges(graph: &DataflowGraph, registry: &ModuleRegistry, report: &mut ValidationReport) {
    for edge in &graph.edges {
        let mut valid = true;

        for (node_id, port, side) in [
            (&edge.source, edge.source_port(), PortSide::Source),
            (&edge.target, edge.target_port(), PortSide::Target),
        ] {
            let Some(node) = graph.find_node(node_id) else {
                report.errors.push(ValidationError::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: node_id.clone(),
                });
                valid = false;
                continue;
            };

            let (Some(port_id), Some(module)) = (port, registry.get(&node.module_id)) else {
                continue;
            };
            let declared = match side {
                PortSide::Source => module.has_output(port_id),
                PortSide::Target => module.has_input(port_id),
            };
            if !declared {
                report.errors.push(ValidationError::UnknownPort {
                    edge_id: edge.id.clone(),
                    node_id: node_id.clone(),
                    port_id: port_id.to_string(),
                    side,
                });
                valid = false;
            }
        }

        if !valid {
            report.invalid_edges.insert(edge.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::types::{ModuleDefinition, PortDefinition, PortType};

    fn make_test_registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register(
            ModuleDefinition::new("source", "function execute() { return { out: 1 }; }")
                .with_output(PortDefinition::new("out", PortType::Number)),
        );
        registry.register(
            ModuleDefinition::new("sink", "function execute(i) { return { out: i.value }; }")
                .with_input(PortDefinition::new("value", PortType::Number))
                .with_output(PortDefinition::new("out", PortType::Number)),
        );
        registry
    }

    #[test]
    fn test_valid_graph() {
        let graph = GraphBuilder::new("g", "Valid")
            .add_node("a", "source")
            .add_node("b", "sink")
            .add_edge("a", "out", "b", "value")
            .build();

        let report = validate(&graph, &make_test_registry());
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.valid_edges(&graph).len(), 1);
    }

    #[test]
    fn test_unknown_node_excludes_edge() {
        let graph = GraphBuilder::new("g", "Dangling")
            .add_node("a", "source")
            .add_edge_with_id("e-bad", "a", "out", "ghost", "value")
            .build();

        let report = validate(&graph, &make_test_registry());
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownNode {
                edge_id: "e-bad".into(),
                node_id: "ghost".into(),
            }]
        );
        assert!(!report.is_edge_valid("e-bad"));
        assert!(report.valid_edges(&graph).is_empty());
    }

    #[test]
    fn test_unknown_ports() {
        let graph = GraphBuilder::new("g", "Ports")
            .add_node("a", "source")
            .add_node("b", "sink")
            .add_edge_with_id("e1", "a", "missing", "b", "value")
            .add_edge_with_id("e2", "a", "out", "b", "nope")
            .add_edge_with_id("e3", "a", "", "b", "")
            .build();

        let report = validate(&graph, &make_test_registry());
        assert_eq!(report.invalid_edge_ids(), vec!["e1", "e2"]);
        assert!(report.is_edge_valid("e3"));
        assert_eq!(
            report.errors[0].to_string(),
            "Edge 'e1' references unknown output port 'missing' on node 'a'"
        );
        assert_eq!(
            report.errors[1].to_string(),
            "Edge 'e2' references unknown input port 'nope' on node 'b'"
        );
    }

    #[test]
    fn test_unknown_module_does_not_invalidate_edges() {
        let graph = GraphBuilder::new("g", "Unknown")
            .add_node("a", "source")
            .add_node("b", "not_registered")
            .add_edge("a", "out", "b", "anything")
            .build();

        let report = validate(&graph, &make_test_registry());
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownModule {
                node_id: "b".into(),
                module_id: "not_registered".into(),
            }]
        );
        assert_eq!(report.valid_edges(&graph).len(), 1);
    }

    #[test]
    fn test_duplicate_node() {
        let graph = GraphBuilder::new("g", "Dup")
            .add_node("a", "source")
            .add_node("a", "source")
            .build();

        let report = validate(&graph, &make_test_registry());
        assert_eq!(
            report.errors,
            vec![ValidationError::DuplicateNode { node_id: "a".into() }]
        );
    }

    #[test]
    fn test_detect_cycle_keeps_cycle_edges() {
        let graph = GraphBuilder::new("g", "Cycle")
            .add_node("a", "sink")
            .add_node("b", "sink")
            .add_edge("a", "out", "b", "value")
            .add_edge("b", "out", "a", "value")
            .build();

        let report = validate(&graph, &make_test_registry());
        let cycles: Vec<&[NodeId]> = report.cycles().collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].to_vec(), vec!["a", "b"]);
        assert_eq!(report.valid_edges(&graph).len(), 2);
        assert_eq!(
            report.errors[0].to_string(),
            "Cycle detected between nodes: a, b"
        );
    }

    #[test]
    fn test_invalid_edge_cannot_close_cycle() {
        let graph = GraphBuilder::new("g", "Broken cycle")
            .add_node("a", "sink")
            .add_node("b", "sink")
            .add_edge("a", "out", "b", "value")
            .add_edge("b", "wrong", "a", "value")
            .build();

        let report = validate(&graph, &make_test_registry());
        assert_eq!(report.cycles().count(), 0);
        assert_eq!(report.errors.len(), 1);
    }
}
