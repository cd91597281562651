//! Evaluation order for dataflow graphs
//!
//! The schedule is a dependency-respecting topological order computed with
//! Kahn's algorithm. Among nodes that are ready at the same time, the
//! smallest node id goes first, so identical graphs always produce identical
//! orders.
//!
//! Nodes on a dependency cycle are never ordered. They are reported in
//! [`Schedule::cyclic`] and the engine gives them a terminal failure. Nodes
//! that are only *downstream* of a cycle are ordered after every node of the
//! acyclic part, with the cycle's outputs treated as missing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::types::{DataflowGraph, GraphEdge, NodeId};

/// Computed evaluation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Nodes in evaluation order
    pub order: Vec<NodeId>,
    /// Nodes on a dependency cycle, sorted by id
    pub cyclic: Vec<NodeId>,
    /// Nodes the first topological pass could not order, sorted by id:
    /// cycle members plus everything downstream of a cycle
    pub blocked: Vec<NodeId>,
}

impl Schedule {
    /// Check whether a node is on a cycle
    pub fn is_cyclic(&self, node_id: &str) -> bool {
        self.cyclic.binary_search_by(|id| id.as_str().cmp(node_id)).is_ok()
    }

    /// Keep only the given nodes, preserving the relative order
    pub fn restrict_to(&self, nodes: &BTreeSet<NodeId>) -> Schedule {
        Schedule {
            order: self.order.iter().filter(|id| nodes.contains(*id)).cloned().collect(),
            cyclic: self.cyclic.iter().filter(|id| nodes.contains(*id)).cloned().collect(),
            blocked: self.blocked.iter().filter(|id| nodes.contains(*id)).cloned().collect(),
        }
    }

    /// Number of nodes covered by this schedule
    pub fn len(&self) -> usize {
        self.order.len() + self.cyclic.len()
    }

    /// Check whether the schedule covers no nodes
    pub fn is_empty(&self) -> bool {
        self.order.is_empty() && self.cyclic.is_empty()
    }
}

/// Adjacency over the unique node ids of a graph
///
/// Edges whose endpoints are not nodes of the graph are ignored; parallel
/// edges between the same pair count once.
struct Adjacency<'g> {
    nodes: BTreeSet<&'g str>,
    downstream: BTreeMap<&'g str, BTreeSet<&'g str>>,
}

impl<'g> Adjacency<'g> {
    fn new(graph: &'g DataflowGraph, edges: &[&'g GraphEdge]) -> Self {
        let nodes: BTreeSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut downstream: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for edge in edges {
            let (source, target) = (edge.source.as_str(), edge.target.as_str());
            if nodes.contains(source) && nodes.contains(target) {
                downstream.entry(source).or_default().insert(target);
            }
        }
        Self { nodes, downstream }
    }

    fn targets(&self, node: &str) -> impl Iterator<Item = &'g str> + '_ {
        self.downstream.get(node).into_iter().flat_map(|t| t.iter().copied())
    }
}

/// Compute the evaluation order for a graph over the given edges
///
/// Pass only the edges that passed validation.
pub fn build_schedule<'g>(graph: &'g DataflowGraph, edges: &[&'g GraphEdge]) -> Schedule {
    let adjacency = Adjacency::new(graph, edges);

    let mut order = kahn(&adjacency, &adjacency.nodes, &HashSet::new());
    if order.len() == adjacency.nodes.len() {
        return Schedule {
            order: order.into_iter().map(str::to_string).collect(),
            cyclic: Vec::new(),
            blocked: Vec::new(),
        };
    }

    let ordered: HashSet<&str> = order.iter().copied().collect();
    let leftover: BTreeSet<&str> = adjacency
        .nodes
        .iter()
        .copied()
        .filter(|id| !ordered.contains(id))
        .collect();
    let cyclic: HashSet<&str> = cycle_components(&adjacency, &leftover)
        .into_iter()
        .flatten()
        .collect();

    // Everything left that is not itself on a cycle sits downstream of one
    let downstream: BTreeSet<&str> = leftover
        .iter()
        .copied()
        .filter(|id| !cyclic.contains(id))
        .collect();
    order.extend(kahn(&adjacency, &downstream, &cyclic));

    log::debug!(
        "Scheduled {} nodes, {} on cycles: {:?}",
        order.len(),
        cyclic.len(),
        cyclic
    );

    Schedule {
        order: order.into_iter().map(str::to_string).collect(),
        cyclic: sorted(cyclic),
        blocked: leftover.into_iter().map(str::to_string).collect(),
    }
}

fn sorted(ids: HashSet<&str>) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = ids.into_iter().map(str::to_string).collect();
    ids.sort_unstable();
    ids
}

/// Kahn's algorithm over `subset`, ignoring edges that start in `ignored`
/// or outside the subset. Ready nodes are taken in ascending id order.
fn kahn<'g>(
    adjacency: &Adjacency<'g>,
    subset: &BTreeSet<&'g str>,
    ignored: &HashSet<&'g str>,
) -> Vec<&'g str> {
    let mut in_degree: HashMap<&str, usize> = subset.iter().map(|&id| (id, 0)).collect();
    for &source in subset {
        if ignored.contains(source) {
            continue;
        }
        for target in adjacency.targets(source) {
            if let Some(deg) = in_degree.get_mut(target) {
                *deg += 1;
            }
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(subset.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for target in adjacency.targets(node) {
            if let Some(deg) = in_degree.get_mut(target) {
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(target);
                }
            }
        }
    }
    order
}

/// Dependency cycles of a graph over the given edges
///
/// Each cycle is one strongly connected component with more than one node,
/// or a single node with a self-edge. Members are sorted by id and the
/// cycles are sorted by their first member.
pub fn find_cycles<'g>(graph: &'g DataflowGraph, edges: &[&'g GraphEdge]) -> Vec<Vec<NodeId>> {
    let adjacency = Adjacency::new(graph, edges);
    let mut cycles: Vec<Vec<NodeId>> = cycle_components(&adjacency, &adjacency.nodes)
        .into_iter()
        .map(|component| component.into_iter().map(str::to_string).collect())
        .collect();
    cycles.sort();
    cycles
}

/// Cyclic strongly connected components of `subset`
///
/// Tarjan's algorithm with an explicit stack, so deep chains cannot
/// overflow the call stack.
fn cycle_components<'g>(adjacency: &Adjacency<'g>, subset: &BTreeSet<&'g str>) -> Vec<Vec<&'g str>> {
    let mut counter = 0usize;
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut lowlink: HashMap<&str, usize> = HashMap::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut components: Vec<Vec<&str>> = Vec::new();

    for &start in subset {
        if index.contains_key(start) {
            continue;
        }
        index.insert(start, counter);
        lowlink.insert(start, counter);
        counter += 1;
        stack.push(start);
        on_stack.insert(start);

        let mut work: Vec<(&str, Vec<&str>, usize)> = vec![(start, children(adjacency, subset, start), 0)];
        while let Some(frame) = work.last_mut() {
            let node = frame.0;
            if frame.2 < frame.1.len() {
                let child = frame.1[frame.2];
                frame.2 += 1;
                if !index.contains_key(child) {
                    index.insert(child, counter);
                    lowlink.insert(child, counter);
                    counter += 1;
                    stack.push(child);
                    on_stack.insert(child);
                    work.push((child, children(adjacency, subset, child), 0));
                } else if on_stack.contains(child) {
                    let child_index = index[child];
                    if let Some(low) = lowlink.get_mut(node) {
                        *low = (*low).min(child_index);
                    }
                }
                continue;
            }

            work.pop();
            let node_low = lowlink[node];
            if let Some((parent, _, _)) = work.last() {
                if let Some(low) = lowlink.get_mut(parent) {
                    *low = (*low).min(node_low);
                }
            }

            if node_low == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                let self_loop = adjacency.targets(node).any(|t| t == node);
                if component.len() > 1 || self_loop {
                    component.sort_unstable();
                    components.push(component);
                }
            }
        }
    }

    components
}

fn children<'g>(adjacency: &Adjacency<'g>, subset: &BTreeSet<&'g str>, node: &str) -> Vec<&'g str> {
    adjacency.targets(node).filter(|t| subset.contains(t)).collect()
}

/// The changed nodes plus every node reachable downstream of them
///
/// Ids that are not nodes of the graph are dropped.
pub fn dirty_closure(
    graph: &DataflowGraph,
    edges: &[&GraphEdge],
    changed: &[NodeId],
) -> BTreeSet<NodeId> {
    let adjacency = Adjacency::new(graph, edges);
    let mut closure: BTreeSet<&str> = BTreeSet::new();
    let mut pending: Vec<&str> = changed
        .iter()
        .filter_map(|id| adjacency.nodes.get(id.as_str()).copied())
        .collect();

    while let Some(node) = pending.pop() {
        if closure.insert(node) {
            pending.extend(adjacency.targets(node));
        }
    }

    closure.into_iter().map(str::to_string).collect()
}
