use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use lucid_domain::message::ToolDefinition;

use crate::Tool;

/// In-process tool registry: the "local" provider.
///
/// Delegate tools (agent delegation) and the built-in memory tools register
/// here; agents reference them by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its declared name. Replaces any previous
    /// registration with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.describe().name;
        tracing::debug!(tool_name = %name, "tool registered");
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .values()
            .map(|t| t.describe())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnTool, ToolContext};

    fn noop(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            name,
            "noop",
            serde_json::json!({"type": "object"}),
            |_args, _ctx| async move { serde_json::json!({"status": "success"}) },
        ))
    }

    #[test]
    fn register_and_lookup() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(noop("search"));
        registry.register(noop("save_moments"));
        assert!(registry.contains("search"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn definitions_are_sorted() {
        let registry = ToolRegistry::new();
        registry.register(noop("zeta"));
        registry.register(noop("alpha"));
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn replacement_takes_latest() {
        let registry = ToolRegistry::new();
        registry.register(noop("echo"));
        registry.register(Arc::new(FnTool::new(
            "echo",
            "second",
            serde_json::json!({"type": "object"}),
            |_args, _ctx| async move { serde_json::json!({"version": 2}) },
        )));
        let out = registry
            .get("echo")
            .unwrap()
            .invoke(serde_json::json!({}), &ToolContext::default())
            .await;
        assert_eq!(out["version"], 2);
    }
}
