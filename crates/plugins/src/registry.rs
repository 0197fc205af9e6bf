//! Plugin registry.
//!
//! Maps tool names to their plugins so the installer can look up a tool
//! and its dependencies by name.

use std::collections::HashMap;
use std::sync::Arc;
use toolvm_core::{Error, Plugin, Result};

/// Registered plugins indexed by tool name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    ///
    /// A plugin with the same name is replaced.
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) {
        self.register_arc(Arc::new(plugin));
    }

    /// Register a shared plugin.
    pub fn register_arc(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Look up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(name)
    }

    /// Look up a plugin by name, failing if none is registered.
    ///
    /// # Errors
    ///
    /// [`Error::PluginNotFound`].
    pub fn require(&self, name: &str) -> Result<&Arc<dyn Plugin>> {
        self.get(name)
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }

    /// Iterate over registered plugins in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.values()
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
