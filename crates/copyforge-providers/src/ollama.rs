//! Local Ollama daemon.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::{endpoint, handle_response, non_empty, Provider};

/// Default Ollama model.
pub const OLLAMA_DEFAULT_MODEL: &str = "llama2";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

/// Ollama `/api/generate`, non-streaming, no auth.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    /// Create a provider for the daemon at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: endpoint(base_url, "/api/generate"),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        let body: GenerateResponse = handle_response(response).await?;
        non_empty(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_non_streaming_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_json(serde_json::json!({
                "model": "llama2",
                "prompt": "hello",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama2",
                "response": "Hi there!",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(&server.uri(), OLLAMA_DEFAULT_MODEL);
        let text = provider
            .generate("hello", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "Hi there!");
    }

    #[tokio::test]
    async fn missing_response_field_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(&server.uri(), "llama2");
        assert!(matches!(
            provider.generate("x", Duration::from_secs(5)).await,
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_daemon_is_unavailable() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let provider = OllamaProvider::new(&uri, "llama2");
        assert!(matches!(
            provider.generate("x", Duration::from_secs(2)).await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
