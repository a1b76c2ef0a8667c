//! Ordered provider fallback.
//!
//! The selector tries each provider in priority order under a per-call
//! timeout and returns the first success. It runs once per metered operation,
//! so however many providers are tried the caller is charged once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderFailure, SelectorError};
use crate::provider::Provider;

/// Default per-provider timeout.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Generated text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// The generated text.
    pub text: String,

    /// Name of the provider that produced it.
    pub provider: String,
}

/// Tries providers in order until one succeeds.
#[derive(Clone)]
pub struct Selector {
    providers: Vec<Arc<dyn Provider>>,
    timeout: Duration,
}

impl Selector {
    /// Create a selector over `providers`, highest priority first.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Set the per-provider timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Provider names in priority order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Generate text from the first provider that succeeds.
    ///
    /// # Errors
    ///
    /// - `NoProviders` if none are configured
    /// - `AllFailed` with every provider's failure if none succeeded
    pub async fn select(&self, prompt: &str) -> Result<Content, SelectorError> {
        if self.providers.is_empty() {
            return Err(SelectorError::NoProviders);
        }

        let mut failures = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name();
            let start = Instant::now();
            debug!(provider = name, "Trying provider");

            let outcome = tokio::time::timeout(self.timeout, provider.generate(prompt, self.timeout))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Unavailable(format!(
                        "timed out after {}s",
                        self.timeout.as_secs_f32()
                    )))
                });

            match outcome {
                Ok(text) => {
                    info!(
                        provider = name,
                        elapsed_ms = start.elapsed().as_millis(),
                        fallbacks = failures.len(),
                        "Provider succeeded"
                    );
                    return Ok(Content {
                        text,
                        provider: name.to_string(),
                    });
                }
                Err(error) => {
                    warn!(
                        provider = name,
                        elapsed_ms = start.elapsed().as_millis(),
                        error = %error,
                        "Provider failed, falling back"
                    );
                    failures.push(ProviderFailure {
                        provider: name.to_string(),
                        error,
                    });
                }
            }
        }

        Err(SelectorError::AllFailed(failures))
    }
}
