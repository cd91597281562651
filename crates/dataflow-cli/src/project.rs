//! Project files
//!
//! A project is one JSON document holding the graph, optional custom
//! modules and an optional engine configuration:
//!
//! ```json
//! { "graph": { "id": "g-1", "nodes": [], "edges": [] }, "modules": [], "config": {} }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use dataflow_engine::{DataflowGraph, EngineConfig, ModuleDefinition, ModuleRegistry, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub graph: DataflowGraph,
    /// Project modules; they override presets with the same id
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
    #[serde(default)]
    pub config: Option<EngineConfig>,
}

impl Project {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let project: Self = serde_json::from_str(json)?;
        if let Some(config) = &project.config {
            config.validate()?;
        }
        Ok(project)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let project = Self::from_json_str(&content)?;
        log::info!(
            "Loaded project '{}' from {:?}: {} nodes, {} custom modules",
            project.graph.id,
            path,
            project.graph.nodes.len(),
            project.modules.len()
        );
        Ok(project)
    }

    /// Presets plus the project modules
    pub fn registry(&self) -> ModuleRegistry {
        let mut registry = ModuleRegistry::with_presets();
        registry.merge(self.modules.iter().cloned().collect());
        registry
    }
}
