//! Metered content generation handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use copyforge_core::{EntryStatus, IdempotencyKey, OperationKind};
use copyforge_providers::{Content, Platform};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Longest accepted prompt, in characters.
const MAX_PROMPT_CHARS: usize = 2000;

/// Header carrying the caller's idempotency key.
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Generation request.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// What the post is about.
    pub prompt: String,
    /// Target platform (default: generic).
    #[serde(default)]
    pub platform: Option<String>,
    /// Used when no `Idempotency-Key` header is sent.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Generation response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// The generated post.
    pub text: String,
    /// Provider that wrote it.
    pub provider: String,
    /// Platform it was written for.
    pub platform: Platform,
    /// Key the charge was recorded under; resend it to retry safely.
    pub idempotency_key: String,
    /// Credits charged by this call (0 on exempt plans and replays).
    pub cost: i64,
    /// Credits left after this operation.
    pub available: i64,
    /// Whether the account is running low.
    pub low_balance: bool,
}

/// Generate a post, charging the caller once per idempotency key.
pub async fn generate_content(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("Prompt must not be empty".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Prompt must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }

    let platform: Platform = body
        .platform
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let key = idempotency_key(&headers, body.idempotency_key.as_deref())?;

    // The token's plan only seeds a new account; plan changes go through
    // `POST /v1/accounts`.
    let account = state.ledger.ensure_account(&auth.account_id, auth.plan).await?;
    let operation = state
        .config
        .pricing
        .operation(OperationKind::GenerateContent, key.clone())
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::debug!(
        account_id = %auth.account_id,
        key = %key,
        cost = operation.cost,
        platform = %platform,
        "Generating content"
    );

    let replayed = state.ledger.head(&key).await?.is_some_and(|head| {
        head.account_id == auth.account_id && head.status == EntryStatus::Committed
    });

    let full_prompt = platform.prompt(prompt);
    let content: Content = state
        .gateway
        .perform(&auth.account_id, &operation, || state.selector.select(&full_prompt))
        .await?;

    let account = match state.ledger.account(&auth.account_id).await {
        Ok(latest) => latest,
        Err(e) => {
            // The charge already settled; report the balance we had.
            tracing::warn!(account_id = %auth.account_id, error = %e, "Balance refresh failed");
            account
        }
    };

    Ok(Json(GenerateResponse {
        text: content.text,
        provider: content.provider,
        platform,
        idempotency_key: key.to_string(),
        cost: if replayed || account.is_exempt() {
            0
        } else {
            operation.cost
        },
        available: account.available(),
        low_balance: account.is_low_balance(),
    }))
}

/// The `Idempotency-Key` header, else the body field, else a fresh key.
fn idempotency_key(
    headers: &HeaderMap,
    from_body: Option<&str>,
) -> Result<IdempotencyKey, ApiError> {
    let from_header = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::BadRequest("Invalid Idempotency-Key header".into()))
        })
        .transpose()?;

    match from_header.or(from_body) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("Invalid idempotency key".into())),
        None => Ok(IdempotencyKey::generate()),
    }
}
