//! Provider router — selects the correct completion provider based on config.

use crate::openai_compat::OpenAiCompatProvider;
use bashpilot_config::AppConfig;
use bashpilot_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes completion requests to the configured provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` table becomes an OpenAI-compatible provider;
/// the default provider is always registered when it has a base URL, either
/// from its table or from the well-known presets. A name with neither is
/// skipped, never guessed.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    let names = config
        .providers
        .keys()
        .map(String::as_str)
        .chain(std::iter::once(config.default_provider.as_str()));

    for name in names {
        if router.get(name).is_some() {
            continue;
        }
        let Some(base_url) = config.provider_base_url(name) else {
            warn!(provider = %name, "No api_url and no preset, skipping provider");
            continue;
        };

        let api_key = config
            .providers
            .get(name)
            .and_then(|p| p.api_key.clone())
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        debug!(provider = %name, base_url = %base_url, "Registering provider");
        router.register(
            name,
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)),
        );
    }

    router
}

/// Whether a provider can be used without an API key.
pub fn is_keyless(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp")
}
