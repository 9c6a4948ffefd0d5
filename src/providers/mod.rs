mod authentik;
mod config;
mod google;

use std::collections::BTreeMap;

pub use authentik::authentik_provider;
pub use config::{ProviderConfig, ProviderEndpoints, ProviderFlags};
pub use google::google_provider;

/// Static lookup from provider name to its configuration.
///
/// Built once at start-up and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, config: ProviderConfig) -> Self {
        self.register(config);
        self
    }

    /// Registers `config` under its name, replacing any earlier entry.
    pub fn register(&mut self, config: ProviderConfig) {
        self.providers.insert(config.name.clone(), config);
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
