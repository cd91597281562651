//! Per-node execution results
//!
//! The [`ResultStore`] is owned by one engine. Entries are overwritten when
//! a node runs again, removed when the node is deleted and cleared on reset.
//! Entries written by a run that was abandoned are kept but flagged stale
//! until the next run overwrites them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::structure::ValueStructure;
use crate::types::{NodeId, PortValues};

/// Outcome of executing one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PortValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structure summary per output key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_format: BTreeMap<String, ValueStructure>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    /// Successful result carrying an output record
    pub fn success(output: PortValues) -> Self {
        let output_format = output
            .iter()
            .map(|(key, value)| (key.clone(), ValueStructure::of(value)))
            .collect();
        Self {
            success: true,
            output: Some(output),
            error: None,
            output_format,
            execution_time_ms: 0,
        }
    }

    /// Failed result carrying an error message
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            output_format: BTreeMap::new(),
            execution_time_ms: 0,
        }
    }

    /// Record how long the node took
    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    /// Output value on one port, if this result is a success
    pub fn output_value(&self, port_id: &str) -> Option<&Value> {
        self.successful_output()?.get(port_id)
    }

    /// Output record, only when this result is a success
    pub fn successful_output(&self) -> Option<&PortValues> {
        if self.success {
            self.output.as_ref()
        } else {
            None
        }
    }
}

impl From<EngineError> for ExecutionResult {
    fn from(err: EngineError) -> Self {
        Self::failure(err.to_string())
    }
}

/// Results of the most recent run of each node
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    entries: BTreeMap<NodeId, ExecutionResult>,
    stale: BTreeSet<NodeId>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecutionResult> {
        self.entries.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.entries.contains_key(node_id)
    }

    /// Store a result, replacing the previous one and clearing staleness
    pub fn insert(&mut self, node_id: impl Into<NodeId>, result: ExecutionResult) -> Option<ExecutionResult> {
        let node_id = node_id.into();
        self.stale.remove(&node_id);
        self.entries.insert(node_id, result)
    }

    pub fn remove(&mut self, node_id: &str) -> Option<ExecutionResult> {
        self.stale.remove(node_id);
        self.entries.remove(node_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stale.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by node id
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &ExecutionResult)> {
        self.entries.iter()
    }

    /// Check whether an entry was written by an abandoned run
    pub fn is_stale(&self, node_id: &str) -> bool {
        self.stale.contains(node_id)
    }

    /// Flag entries as stale; ids without an entry are ignored
    pub fn mark_stale<'a>(&mut self, node_ids: impl IntoIterator<Item = &'a NodeId>) {
        for id in node_ids {
            if self.entries.contains_key(id) {
                self.stale.insert(id.clone());
            }
        }
    }

    /// Ids of stale entries, sorted
    pub fn stale_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.stale.iter()
    }

    /// Owned copy of every entry, ordered by node id
    pub fn snapshot(&self) -> BTreeMap<NodeId, ExecutionResult> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(value: Value) -> PortValues {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_success_records_structure() {
        let result = ExecutionResult::success(output(json!({"profit": 12.5, "rows": [1, 2]})));
        assert!(result.success);
        assert_eq!(result.output_format["profit"].kind(), "number");
        assert_eq!(result.output_format["rows"].kind(), "array");
        assert_eq!(result.output_value("profit"), Some(&json!(12.5)));
    }

    #[test]
    fn test_failure_has_no_output() {
        let result: ExecutionResult = EngineError::ModuleNotFound("ghost".into()).into();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("module not found: ghost"));
        assert!(result.successful_output().is_none());
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(ExecutionResult::failure("boom")).unwrap();
        assert_eq!(json, json!({"success": false, "error": "boom", "executionTimeMs": 0}));
    }

    #[test]
    fn test_store_overwrite_and_remove() {
        let mut store = ResultStore::new();
        store.insert("b", ExecutionResult::failure("first"));
        store.insert("a", ExecutionResult::success(PortValues::new()));
        let previous = store.insert("b", ExecutionResult::failure("second"));

        assert_eq!(previous.unwrap().error.as_deref(), Some("first"));
        let ids: Vec<&NodeId> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(store.remove("a").is_some());
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_cleared_by_insert() {
        let mut store = ResultStore::new();
        store.insert("a", ExecutionResult::failure("x"));
        let ids = vec!["a".to_string(), "missing".to_string()];
        store.mark_stale(&ids);

        assert!(store.is_stale("a"));
        assert!(!store.is_stale("missing"));

        store.insert("a", ExecutionResult::failure("y"));
        assert!(!store.is_stale("a"));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut store = ResultStore::new();
        store.insert("a", ExecutionResult::failure("x"));
        let snapshot = store.snapshot();
        store.clear();
        assert_eq!(snapshot.len(), 1);
    }
}
