//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use copyforge_core::Account;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID.
    pub account_id: String,
    /// Current plan.
    pub plan: String,
    /// Committed balance in credits.
    pub balance: i64,
    /// Credits held by pending reservations.
    pub reserved: i64,
    /// Credits that can still be spent.
    pub available: i64,
    /// Lifetime credits granted.
    pub lifetime_granted: i64,
    /// Lifetime credits used.
    pub lifetime_used: i64,
    /// Whether the account is exempt from debits.
    pub exempt: bool,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.account_id.to_string(),
            plan: account.plan.to_string(),
            balance: account.balance,
            reserved: account.reserved,
            available: account.available(),
            lifetime_granted: account.lifetime_granted,
            lifetime_used: account.lifetime_used,
            exempt: account.is_exempt(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Open the caller's account, or move it to the plan in their token.
///
/// Safe to call on every sign-in: an account already on the token's plan is
/// returned unchanged.
pub async fn open_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.ledger.open_account(&auth.account_id, auth.plan).await?;

    tracing::info!(account_id = %auth.account_id, plan = %auth.plan, "Account synced");

    Ok(Json(AccountResponse::from(&account)))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.ledger.account(&auth.account_id).await?;

    Ok(Json(AccountResponse::from(&account)))
}
