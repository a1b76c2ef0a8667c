//! Application state.

use std::sync::Arc;
use std::time::Duration;

use copyforge_metering::{Gateway, Ledger, LedgerError};
use copyforge_providers::{ChatCompletionsProvider, OllamaProvider, Provider, Selector};
use copyforge_store::LedgerStore;

use crate::config::{ProvidersConfig, ServiceConfig};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Account management and history.
    pub ledger: Ledger,

    /// Metered execution over the same ledger.
    pub gateway: Gateway,

    /// Generation providers in fallback order.
    pub selector: Selector,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnsupportedStore` if the store cannot make its
    /// writes atomic.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        selector: Selector,
        config: ServiceConfig,
    ) -> Result<Self, LedgerError> {
        let ledger = Ledger::new(store)?;
        let gateway = Gateway::new(ledger.clone());

        if selector.provider_names().is_empty() {
            tracing::warn!("No generation providers configured - /v1/generate will fail");
        }

        Ok(Self {
            ledger,
            gateway,
            selector,
            config,
        })
    }
}

/// Build the provider selector from configuration.
///
/// Providers are tried in `order`; names without credentials are skipped.
#[must_use]
pub fn build_selector(config: &ProvidersConfig) -> Selector {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    for name in &config.order {
        let provider: Option<Arc<dyn Provider>> = match name.as_str() {
            "upstage" => config.upstage.as_ref().map(|c| {
                Arc::new(ChatCompletionsProvider::upstage(
                    &c.api_url,
                    c.api_key.clone(),
                    c.model.clone(),
                )) as Arc<dyn Provider>
            }),
            "mistral" => config.mistral.as_ref().map(|c| {
                Arc::new(ChatCompletionsProvider::mistral(
                    &c.api_url,
                    c.api_key.clone(),
                    c.model.clone(),
                )) as Arc<dyn Provider>
            }),
            "ollama" => config
                .ollama
                .as_ref()
                .map(|c| Arc::new(OllamaProvider::new(&c.url, c.model.clone())) as Arc<dyn Provider>),
            other => {
                tracing::warn!(provider = %other, "Unknown provider in PROVIDER_ORDER");
                None
            }
        };

        match provider {
            Some(provider) => {
                tracing::info!(provider = %name, "Generation provider enabled");
                providers.push(provider);
            }
            None => tracing::debug!(provider = %name, "Generation provider not configured"),
        }
    }

    Selector::new(providers).with_timeout(Duration::from_secs(config.timeout_seconds))
}
