//! Content generation providers for copyforge.
//!
//! Every backend implements [`Provider`]; the [`Selector`] tries them in
//! priority order with a per-call timeout and returns the first success.
//!
//! | provider | endpoint | auth |
//! |---|---|---|
//! | Upstage | `POST /v1/solar/chat/completions` | bearer |
//! | Mistral | `POST /v1/chat/completions` | bearer |
//! | Ollama | `POST /api/generate` | none |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use copyforge_providers::{ChatCompletionsProvider, OllamaProvider, Platform, Selector};
//!
//! # async fn demo() -> Result<(), copyforge_providers::SelectorError> {
//! let selector = Selector::new(vec![
//!     Arc::new(ChatCompletionsProvider::upstage("https://api.upstage.ai", "key", "solar-1-mini-chat")),
//!     Arc::new(OllamaProvider::new("http://localhost:11434", "llama2")),
//! ]);
//!
//! let content = selector.select(&Platform::Twitter.prompt("launch day")).await?;
//! println!("{} wrote: {}", content.provider, content.text);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod chat;
pub mod error;
pub mod ollama;
pub mod prompt;
pub mod provider;
pub mod selector;

pub use chat::{
    ChatCompletionsProvider, MISTRAL_DEFAULT_MODEL, MISTRAL_DEFAULT_URL, UPSTAGE_DEFAULT_MODEL,
    UPSTAGE_DEFAULT_URL,
};
pub use error::{ProviderError, ProviderFailure, SelectorError};
pub use ollama::{OllamaProvider, OLLAMA_DEFAULT_MODEL};
pub use prompt::{Platform, UnknownPlatform};
pub use provider::Provider;
pub use selector::{Content, Selector, DEFAULT_PROVIDER_TIMEOUT};
