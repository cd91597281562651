//! Input resolution for a node
//!
//! Builds the input bag of a node from its incoming edges and the results
//! already stored for the upstream nodes.
//!
//! # Smart extraction
//!
//! Upstream routines often wrap their value in an object that repeats the
//! target port name, e.g. `{ output: { cost: 100 } }` wired into the `cost`
//! input. For an edge into a named port:
//!
//! 1. The candidate is `output[sourceHandle]`, or the whole output when the
//!    edge has no source handle.
//! 2. If the candidate is a plain object holding the target port name, that
//!    field is bound. Otherwise the candidate itself is bound; arrays are
//!    never unwrapped.
//!
//! An edge without a target handle spreads an object candidate into the
//! inputs and ignores anything else.

use serde_json::Value;

use crate::results::ResultStore;
use crate::types::{GraphEdge, PortValues};

/// Check for a JSON object; arrays, null and primitives are not
pub fn is_plain_object(value: &Value) -> bool {
    matches!(value, Value::Object(_))
}

/// Field `key` of `value` when `value` is a plain object holding it
pub fn extract_field<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        _ => None,
    }
}

/// Resolve the inputs of `node_id`
///
/// `edges` must already exclude invalid edges. Edges are applied in edge-id
/// order, so when several edges bind the same input the one with the
/// greatest id wins. Failed, missing or stale upstream results, and
/// missing source fields, leave the input absent.
pub fn resolve_inputs(node_id: &str, edges: &[&GraphEdge], results: &ResultStore) -> PortValues {
    let mut incoming: Vec<&GraphEdge> = edges.iter().copied().filter(|e| e.target == node_id).collect();
    incoming.sort_by(|a, b| a.id.cmp(&b.id));

    let mut inputs = PortValues::new();
    for edge in incoming {
        let usable = results.get(&edge.source).filter(|_| !results.is_stale(&edge.source));
        let Some(output) = usable.and_then(|r| r.successful_output()) else {
            log::trace!("Edge '{}': no usable result from '{}'", edge.id, edge.source);
            continue;
        };

        let whole;
        let candidate = match edge.source_port() {
            Some(port) => match output.get(port) {
                Some(value) => value,
                None => continue,
            },
            None => {
                whole = Value::Object(output.clone());
                &whole
            }
        };

        bind(&mut inputs, edge.target_port(), candidate);
    }

    inputs
}

fn bind(inputs: &mut PortValues, target_port: Option<&str>, candidate: &Value) {
    match target_port {
        Some(port) => {
            let value = if is_plain_object(candidate) {
                extract_field(candidate, port).unwrap_or(candidate)
            } else {
                candidate
            };
            inputs.insert(port.to_string(), value.clone());
        }
        None => {
            if let Value::Object(fields) = candidate {
                for (key, value) in fields {
                    inputs.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
