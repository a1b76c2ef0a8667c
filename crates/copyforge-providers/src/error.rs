//! Error types for content generation.

use std::fmt;

/// Errors a single provider can return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider is throttling us.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited {
        /// Seconds until retry, from `Retry-After`.
        retry_after: Option<u64>,
    },

    /// The provider could not be reached, timed out, or answered with an error.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The provider answered but the body was unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the provider asked us to back off.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// One provider's failure during selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Provider name.
    pub provider: String,

    /// Why it failed.
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Errors from [`Selector::select`](crate::Selector::select).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    /// No providers are configured.
    #[error("no generation providers configured")]
    NoProviders,

    /// Every provider failed, in the order they were tried.
    #[error("all providers failed: {}", join_failures(.0))]
    AllFailed(Vec<ProviderFailure>),
}

impl SelectorError {
    /// Whether any provider turned us away with a rate limit.
    ///
    /// Retrying later can then succeed, so callers should say so rather than
    /// report a generic failure.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::NoProviders => false,
            Self::AllFailed(failures) => failures.iter().any(|f| f.error.is_rate_limited()),
        }
    }

    /// Suggested wait before retrying, if any provider was rate limited.
    ///
    /// The shortest hint among the rate-limited providers wins. Providers
    /// that sent no hint count as one second.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::NoProviders => None,
            Self::AllFailed(failures) => failures
                .iter()
                .filter_map(|f| match f.error {
                    ProviderError::RateLimited { retry_after } => Some(retry_after.unwrap_or(1)),
                    _ => None,
                })
                .min(),
        }
    }
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    retry_after.map_or_else(String::new, |s| format!(", retry after {s}s"))
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
