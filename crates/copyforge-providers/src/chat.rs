//! OpenAI-compatible chat completion providers (Upstage, Mistral).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::{endpoint, handle_response, non_empty, Provider};

/// Default Upstage API URL.
pub const UPSTAGE_DEFAULT_URL: &str = "https://api.upstage.ai";
/// Default Upstage model.
pub const UPSTAGE_DEFAULT_MODEL: &str = "solar-1-mini-chat";
const UPSTAGE_PATH: &str = "/v1/solar/chat/completions";

/// Default Mistral API URL.
pub const MISTRAL_DEFAULT_URL: &str = "https://api.mistral.ai";
/// Default Mistral model.
pub const MISTRAL_DEFAULT_MODEL: &str = "mistral-small-latest";
const MISTRAL_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// A provider speaking the chat completions protocol with bearer auth.
#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    client: Client,
    name: String,
    url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsProvider {
    /// Create a provider posting to `base_url` + `path`.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        path: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            name: name.into(),
            url: endpoint(base_url, path),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Upstage Solar chat completions.
    pub fn upstage(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("upstage", base_url, UPSTAGE_PATH, api_key, model)
    }

    /// Mistral chat completions.
    pub fn mistral(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("mistral", base_url, MISTRAL_PATH, api_key, model)
    }
}

#[async_trait]
impl Provider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        let body: ChatResponse = handle_response(response).await?;
        non_empty(
            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content),
        )
    }
}
