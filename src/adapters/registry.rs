//! Adapter registry — name-keyed lookup built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::{Adapter, ClaudeAdapter, CodexAdapter, OpenCodeAdapter};
use crate::config::AgentBinaries;

/// Registry of available agent adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `claude`, `codex` and `opencode` adapters.
    pub fn with_builtin(binaries: &AgentBinaries) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ClaudeAdapter::new(&binaries.claude)));
        registry.register(Arc::new(CodexAdapter::new(&binaries.codex)));
        registry.register(Arc::new(OpenCodeAdapter::new(&binaries.opencode)));
        registry
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        let name = adapter.name().to_string();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            tracing::warn!(adapter = %name, "Replaced previously registered adapter");
        } else {
            tracing::debug!("Registered adapter: {}", name);
        }
    }

    /// Get an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(name).cloned()
    }

    /// List registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}
