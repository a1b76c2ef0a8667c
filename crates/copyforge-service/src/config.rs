//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use copyforge_core::OperationPricing;
use copyforge_providers::{
    MISTRAL_DEFAULT_MODEL, MISTRAL_DEFAULT_URL, OLLAMA_DEFAULT_MODEL, UPSTAGE_DEFAULT_MODEL,
    UPSTAGE_DEFAULT_URL,
};

/// Which ledger store to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `RocksDB` under `data_dir`.
    RocksDb,
    /// Process memory, lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rocksdb" | "rocks" => Ok(Self::RocksDb),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Settings for an OpenAI-compatible chat provider.
#[derive(Debug, Clone)]
pub struct ChatProviderConfig {
    /// API base URL.
    pub api_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model name.
    pub model: String,
}

/// Settings for a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Daemon URL.
    pub url: String,
    /// Model name.
    pub model: String,
}

/// Generation provider settings.
///
/// A provider is enabled when its credentials (or, for Ollama, its URL) are
/// configured.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    /// Upstage Solar.
    pub upstage: Option<ChatProviderConfig>,
    /// Mistral.
    pub mistral: Option<ChatProviderConfig>,
    /// Ollama.
    pub ollama: Option<OllamaConfig>,
    /// Provider names in fallback order.
    pub order: Vec<String>,
    /// Per-provider timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            upstage: None,
            mistral: None,
            ollama: None,
            order: vec!["upstage".into(), "mistral".into(), "ollama".into()],
            timeout_seconds: 30,
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/copyforge").
    pub data_dir: String,

    /// Ledger store backend (default: `RocksDb`).
    pub store_backend: StoreBackend,

    /// JWT validation base URL (default: `<https://auth.copyforge.app>`).
    pub auth_base_url: String,

    /// Expected JWT audience (default: "copyforge").
    pub auth_audience: String,

    /// Admin API key. The grant endpoint is disabled when unset.
    pub admin_api_key: Option<String>,

    /// Generation providers.
    pub providers: ProvidersConfig,

    /// Credit prices per operation.
    pub pricing: OperationPricing,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Provider secrets file structure.
#[derive(Debug, Default, Deserialize)]
struct ProviderSecrets {
    #[serde(default)]
    upstage_api_key: Option<String>,
    #[serde(default)]
    mistral_api_key: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secrets = load_provider_secrets();

        let store_backend = env_var("STORE_BACKEND")
            .and_then(|s| match s.parse() {
                Ok(backend) => Some(backend),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring STORE_BACKEND");
                    None
                }
            })
            .unwrap_or(defaults.store_backend);

        let upstage = secrets
            .upstage_api_key
            .or_else(|| env_var("UPSTAGE_API_KEY"))
            .map(|api_key| ChatProviderConfig {
                api_url: env_var("UPSTAGE_API_URL").unwrap_or_else(|| UPSTAGE_DEFAULT_URL.into()),
                api_key,
                model: env_var("UPSTAGE_MODEL").unwrap_or_else(|| UPSTAGE_DEFAULT_MODEL.into()),
            });

        let mistral = secrets
            .mistral_api_key
            .or_else(|| env_var("MISTRAL_API_KEY"))
            .map(|api_key| ChatProviderConfig {
                api_url: env_var("MISTRAL_API_URL").unwrap_or_else(|| MISTRAL_DEFAULT_URL.into()),
                api_key,
                model: env_var("MISTRAL_MODEL").unwrap_or_else(|| MISTRAL_DEFAULT_MODEL.into()),
            });

        let ollama = env_var("OLLAMA_URL").map(|url| OllamaConfig {
            url,
            model: env_var("OLLAMA_MODEL").unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.into()),
        });

        let providers = ProvidersConfig {
            upstage,
            mistral,
            ollama,
            order: env_var("PROVIDER_ORDER")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.providers.order),
            timeout_seconds: env_parse("PROVIDER_TIMEOUT_SECONDS")
                .unwrap_or(defaults.providers.timeout_seconds),
        };

        Self {
            listen_addr: env_var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: env_var("DATA_DIR").unwrap_or(defaults.data_dir),
            store_backend,
            auth_base_url: env_var("AUTH_BASE_URL").unwrap_or(defaults.auth_base_url),
            auth_audience: env_var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_api_key: env_var("ADMIN_API_KEY"),
            providers,
            pricing: OperationPricing {
                generate_content: env_parse("GENERATE_CONTENT_COST")
                    .unwrap_or(defaults.pricing.generate_content),
            },
            cors_origins: env_var("CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|s| s.trim().parse().ok())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load provider secrets from file, or nothing if no file is found.
fn load_provider_secrets() -> ProviderSecrets {
    // Try multiple paths for the secrets file
    let secret_paths = [
        ".secrets/providers.json",
        "copyforge/.secrets/providers.json",
        "crates/copyforge-service/.secrets/providers.json",
        "../.secrets/providers.json",
    ];

    for path in &secret_paths {
        match load_secrets_file::<ProviderSecrets>(path) {
            Ok(secrets) => {
                tracing::info!(path = %path, "Loaded provider secrets from file");
                return secrets;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path, error = %e, "Unreadable secrets file"),
        }
    }

    tracing::debug!("Provider secrets file not found, using environment variables");
    ProviderSecrets::default()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/copyforge".into(),
            store_backend: StoreBackend::RocksDb,
            auth_base_url: "https://auth.copyforge.app".into(),
            auth_audience: "copyforge".into(),
            admin_api_key: None,
            providers: ProvidersConfig::default(),
            pricing: OperationPricing::default(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 120,
        }
    }
}
