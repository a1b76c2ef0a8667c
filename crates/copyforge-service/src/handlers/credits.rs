//! Credit balance, history and grant handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use copyforge_core::{AccountId, EntryKind, EntryStatus, IdempotencyKey, LedgerEntry};

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Largest page `list_entries` returns.
const MAX_PAGE_SIZE: usize = 100;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Committed balance in credits.
    pub balance: i64,
    /// Credits held by pending reservations.
    pub reserved: i64,
    /// Credits that can still be spent.
    pub available: i64,
    /// Whether a metered account is running low.
    pub low_balance: bool,
    /// Current plan.
    pub plan: String,
}

/// Get the current balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.ledger.account(&auth.account_id).await?;

    Ok(Json(BalanceResponse {
        balance: account.balance,
        reserved: account.reserved,
        available: account.available(),
        low_balance: account.is_low_balance(),
        plan: account.plan.to_string(),
    }))
}

/// Query parameters for listing entries.
#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    /// Maximum number of entries to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Number of entries to skip.
    #[serde(default)]
    pub offset: usize,
}

const fn default_limit() -> usize {
    50
}

/// A ledger entry as returned by the API.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    /// Entry ID.
    pub entry_id: String,
    /// Idempotency key the entry was recorded under.
    pub idempotency_key: String,
    /// Signed amount in credits.
    pub delta: i64,
    /// Operation or grant reason.
    pub reason: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Settlement status.
    pub status: EntryStatus,
    /// Created timestamp.
    pub created_at: String,
    /// Settled timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<String>,
    /// The charge this entry offsets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensates: Option<String>,
}

impl From<&LedgerEntry> for EntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            entry_id: entry.entry_id.to_string(),
            idempotency_key: entry.idempotency_key.to_string(),
            delta: entry.delta,
            reason: entry.reason.clone(),
            kind: entry.kind,
            status: entry.status,
            created_at: entry.created_at.to_rfc3339(),
            settled_at: entry.settled_at.map(|t| t.to_rfc3339()),
            compensates: entry.compensates.map(|id| id.to_string()),
        }
    }
}

/// Entry list response.
#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    /// Entries, newest first.
    pub entries: Vec<EntryResponse>,
    /// Whether more entries follow this page.
    pub has_more: bool,
}

/// List the caller's ledger entries.
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

    // One extra to learn whether another page exists.
    let mut entries = state
        .ledger
        .entries(&auth.account_id, limit + 1, query.offset)
        .await?;

    let has_more = entries.len() > limit;
    entries.truncate(limit);

    Ok(Json(EntriesResponse {
        entries: entries.iter().map(EntryResponse::from).collect(),
        has_more,
    }))
}

/// Admin grant request.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    /// Account to credit.
    pub account_id: String,
    /// Credits to add.
    pub amount: i64,
    /// Key that makes the grant exactly-once.
    pub idempotency_key: String,
    /// Recorded on the ledger entry.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Grant response.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    /// The credited account.
    pub account_id: String,
    /// Committed balance after the grant.
    pub balance: i64,
    /// Credits that can be spent after the grant.
    pub available: i64,
}

/// Grant credits to an account (admin only).
pub async fn admin_grant_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let account_id: AccountId = body
        .account_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid account ID".into()))?;
    let key: IdempotencyKey = body
        .idempotency_key
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid idempotency key".into()))?;
    let reason = body.reason.as_deref().unwrap_or("admin grant");

    let account = state
        .ledger
        .grant(&account_id, body.amount, &key, reason)
        .await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        account_id = %account_id,
        amount = body.amount,
        key = %key,
        "Admin granted credits"
    );

    Ok(Json(GrantResponse {
        account_id: account_id.to_string(),
        balance: account.balance,
        available: account.available(),
    }))
}
