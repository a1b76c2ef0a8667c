//! Account types for copyforge.
//!
//! This module defines the billable account and the plans it can be on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Available credits below which an account is flagged as running low.
pub const LOW_BALANCE_THRESHOLD: i64 = 20;

/// Credits included with the Basic plan.
pub const BASIC_PLAN_CREDITS: i64 = 500;

/// Credits included with the Pro plan.
pub const PRO_PLAN_CREDITS: i64 = 3000;

/// A billable account.
///
/// `balance` reflects committed ledger entries only. Credits held by pending
/// reservations are tracked in `reserved`, so the amount that can still be
/// spent is `balance - reserved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account ID (from the identity provider).
    pub account_id: AccountId,

    /// Committed credit balance.
    pub balance: i64,

    /// Credits held by pending reservations.
    pub reserved: i64,

    /// Current plan.
    pub plan: Plan,

    /// Lifetime credits granted.
    pub lifetime_granted: i64,

    /// Lifetime credits spent on committed operations.
    pub lifetime_used: i64,

    /// Write version, incremented on every ledger write.
    pub version: u64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(account_id: AccountId, plan: Plan) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            balance: 0,
            reserved: 0,
            plan,
            lifetime_granted: 0,
            lifetime_used: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credits that can still be reserved.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.balance - self.reserved
    }

    /// Check if the account can cover a reservation of `cost` credits.
    #[must_use]
    pub const fn can_reserve(&self, cost: i64) -> bool {
        self.available() >= cost
    }

    /// Check if the account is exempt from debits.
    #[must_use]
    pub const fn is_exempt(&self) -> bool {
        !self.plan.is_metered()
    }

    /// Check if a metered account is running low on credits.
    #[must_use]
    pub const fn is_low_balance(&self) -> bool {
        self.plan.is_metered() && self.available() < LOW_BALANCE_THRESHOLD
    }

    /// Return a copy with the version bumped and `updated_at` refreshed.
    #[must_use]
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        next
    }
}

/// Available plans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Free tier, exempt from debits.
    #[default]
    Freemium,

    /// Basic plan: 500 credits included.
    Basic,

    /// Pro plan: 3000 credits included.
    Pro,

    /// Enterprise plan: credits granted by an operator.
    Enterprise,
}

impl Plan {
    /// Whether operations on this plan are debited.
    #[must_use]
    pub const fn is_metered(&self) -> bool {
        !matches!(self, Self::Freemium)
    }

    /// Credits granted when an account moves onto this plan.
    #[must_use]
    pub const fn included_credits(&self) -> i64 {
        match self {
            Self::Basic => BASIC_PLAN_CREDITS,
            Self::Pro => PRO_PLAN_CREDITS,
            Self::Freemium | Self::Enterprise => 0,
        }
    }

    /// Get the plan name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Freemium => "freemium",
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "freemium" | "free" => Ok(Self::Freemium),
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(crate::CoreError::UnknownPlan(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_zero_balance() {
        let account = Account::new(AccountId::generate(), Plan::Basic);
        assert_eq!(account.balance, 0);
        assert_eq!(account.reserved, 0);
        assert_eq!(account.version, 0);
        assert_eq!(account.lifetime_used, 0);
    }

    #[test]
    fn available_excludes_reservations() {
        let mut account = Account::new(AccountId::generate(), Plan::Pro);
        account.balance = 100;
        account.reserved = 30;

        assert_eq!(account.available(), 70);
        assert!(account.can_reserve(70));
        assert!(!account.can_reserve(71));
    }

    #[test]
    fn freemium_is_exempt_and_never_low() {
        let account = Account::new(AccountId::generate(), Plan::Freemium);
        assert!(account.is_exempt());
        assert!(!account.is_low_balance());

        let basic = Account::new(AccountId::generate(), Plan::Basic);
        assert!(!basic.is_exempt());
        assert!(basic.is_low_balance());
    }

    #[test]
    fn next_version_increments() {
        let account = Account::new(AccountId::generate(), Plan::Basic);
        let next = account.next_version();
        assert_eq!(next.version, 1);
        assert_eq!(next.balance, account.balance);
    }

    #[test]
    fn plan_parsing_and_credits() {
        assert_eq!("Basic".parse::<Plan>().unwrap(), Plan::Basic);
        assert_eq!("free".parse::<Plan>().unwrap(), Plan::Freemium);
        assert!("platinum".parse::<Plan>().is_err());

        assert_eq!(Plan::Freemium.included_credits(), 0);
        assert_eq!(Plan::Basic.included_credits(), 500);
        assert_eq!(Plan::Pro.included_credits(), 3000);
    }
}
