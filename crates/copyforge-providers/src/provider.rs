//! The provider trait and shared HTTP response handling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;

/// A text generation backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name used in logs and error reports.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// - `RateLimited` if the provider throttled the request
    /// - `Unavailable` on transport failure, timeout or non-2xx status
    /// - `InvalidResponse` if the body cannot be read or holds no text
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError>;
}

/// Map the status and decode the JSON body of a provider response.
pub(crate) async fn handle_response<T: DeserializeOwned>(
    response: Response,
) -> Result<T, ProviderError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(ProviderError::RateLimited { retry_after });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Err(ProviderError::Unavailable(format!(
            "status {}: {snippet}",
            status.as_u16()
        )));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// Reject completions that are empty after trimming.
pub(crate) fn non_empty(text: Option<String>) -> Result<String, ProviderError> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(ProviderError::InvalidResponse("empty completion".into())),
    }
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/generate"),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn empty_text_is_invalid() {
        assert!(non_empty(None).is_err());
        assert!(non_empty(Some("  \n".into())).is_err());
        assert_eq!(non_empty(Some(" hi ".into())).unwrap(), "hi");
    }
}
