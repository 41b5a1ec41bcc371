//! Adapter registry
//!
//! Maps provider-type strings to adapters. Seeded with the built-ins at
//! startup and open for runtime registration; lookups are lock-read,
//! registration is lock-write. An unknown type resolves to the
//! OpenAI-compatible adapter instead of failing, which is how the
//! Ollama/LM Studio family rides the gateway without its own adapter.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Adapter, AnthropicAdapter, OpenAiAdapter, OpenAiCompatAdapter};

pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn Adapter>>>,
    fallback: Arc<dyn Adapter>,
}

impl AdapterRegistry {
    /// Registry seeded with the built-in provider families
    pub fn new() -> Self {
        let fallback: Arc<dyn Adapter> = Arc::new(OpenAiCompatAdapter::new());
        let mut adapters: HashMap<String, Arc<dyn Adapter>> = HashMap::new();
        adapters.insert("openai".to_string(), Arc::new(OpenAiAdapter::new()));
        adapters.insert("anthropic".to_string(), Arc::new(AnthropicAdapter::new()));
        adapters.insert("openai-compatible".to_string(), fallback.clone());

        Self {
            adapters: RwLock::new(adapters),
            fallback,
        }
    }

    /// Adapter for a provider type; unknown types get the compat fallback
    pub fn get(&self, provider_type: &str) -> Arc<dyn Adapter> {
        self.adapters
            .read()
            .get(provider_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Register or replace an adapter at runtime
    pub fn register(&self, provider_type: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.write().insert(provider_type.into(), adapter);
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.adapters.read().keys().cloned().collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
