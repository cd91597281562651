//! Module registry
//!
//! Maps module ids to their definitions. Registration is keyed by id, so
//! registering an id again replaces the definition; the editor relies on
//! this when a user edits a module's routine live.
//!
//! # Usage
//!
//! ```ignore
//! use dataflow_engine::{ModuleRegistry, ModuleDefinition};
//!
//! let mut registry = ModuleRegistry::with_presets();
//! registry.register(ModuleDefinition::new("double", "function execute(i) { return { x: i.x * 2 }; }"));
//! ```

use std::collections::HashMap;

use crate::presets;
use crate::types::{ModuleCategory, ModuleDefinition, ModuleId};

/// Registry of module definitions
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = ModuleRegistry::with_presets();
/// registry.merge(project_modules); // project modules override presets
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<ModuleId, ModuleDefinition>,
}

impl ModuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in preset modules
    pub fn with_presets() -> Self {
        let mut registry = Self::new();
        for module in presets::builtin_modules() {
            registry.register(module);
        }
        registry
    }

    /// Register a module, returning the definition it replaced
    pub fn register(&mut self, module: ModuleDefinition) -> Option<ModuleDefinition> {
        log::debug!("Registering module '{}'", module.id);
        self.modules.insert(module.id.clone(), module)
    }

    /// Get a module definition
    pub fn get(&self, module_id: &str) -> Option<&ModuleDefinition> {
        self.modules.get(module_id)
    }

    /// Check if a module is registered
    pub fn contains(&self, module_id: &str) -> bool {
        self.modules.contains_key(module_id)
    }

    /// Remove a module
    pub fn remove(&mut self, module_id: &str) -> Option<ModuleDefinition> {
        self.modules.remove(module_id)
    }

    /// List all registered module ids, sorted
    pub fn module_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.modules.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Get module definitions grouped by category
    pub fn modules_by_category(&self) -> HashMap<ModuleCategory, Vec<&ModuleDefinition>> {
        let mut grouped: HashMap<ModuleCategory, Vec<&ModuleDefinition>> = HashMap::new();
        for module in self.modules.values() {
            grouped.entry(module.category).or_default().push(module);
        }
        for modules in grouped.values_mut() {
            modules.sort_by(|a, b| a.id.cmp(&b.id));
        }
        grouped
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same id.
    pub fn merge(&mut self, other: ModuleRegistry) {
        self.modules.extend(other.modules);
    }
}

impl FromIterator<ModuleDefinition> for ModuleRegistry {
    fn from_iter<I: IntoIterator<Item = ModuleDefinition>>(iter: I) -> Self {
        let mut registry = Self::new();
        for module in iter {
            registry.register(module);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_module(id: &str) -> ModuleDefinition {
        ModuleDefinition::new(id, "function execute(inputs, config, globals) { return {}; }")
            .with_label(format!("Test {}", id), "Test module")
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ModuleRegistry::new();
        registry.register(test_module("test-module"));

        assert!(registry.contains("test-module"));
        assert!(!registry.contains("unknown"));
        assert_eq!(registry.get("test-module").unwrap().name, "Test test-module");
    }

    #[test]
    fn test_reregister_replaces_definition() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.register(test_module("m")).is_none());

        let mut edited = test_module("m");
        edited.routine = "function execute() { return { edited: true }; }".to_string();
        let previous = registry.register(edited).unwrap();

        assert!(previous.routine.contains("return {}"));
        assert!(registry.get("m").unwrap().routine.contains("edited"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_module_ids_sorted() {
        let registry: ModuleRegistry =
            ["zeta", "alpha", "mid"].into_iter().map(test_module).collect();
        assert_eq!(registry.module_ids(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_merge_override() {
        let mut registry1 = ModuleRegistry::new();
        let mut meta1 = test_module("node-a");
        meta1.name = "Original".to_string();
        registry1.register(meta1);

        let mut registry2 = ModuleRegistry::new();
        let mut meta2 = test_module("node-a");
        meta2.name = "Override".to_string();
        registry2.register(meta2);
        registry2.register(test_module("node-b"));

        registry1.merge(registry2);
        assert_eq!(registry1.len(), 2);
        assert_eq!(registry1.get("node-a").unwrap().name, "Override");
    }

    #[test]
    fn test_remove() {
        let mut registry = ModuleRegistry::new();
        registry.register(test_module("m"));
        assert!(registry.remove("m").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_presets_by_category() {
        let registry = ModuleRegistry::with_presets();
        let grouped = registry.modules_by_category();

        assert!(registry.contains("data_input"));
        assert_eq!(grouped.get(&ModuleCategory::Input).unwrap()[0].id, "data_input");
        assert!(grouped.contains_key(&ModuleCategory::Calculation));
    }
}
