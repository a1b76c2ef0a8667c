//! Ledger entry types for copyforge.
//!
//! Every balance change is recorded as a `LedgerEntry`. Entries are never
//! deleted; a charge that is released is marked `Reversed` and offset by a
//! compensating entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, EntryId, IdempotencyKey};

/// An immutable record of a balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub entry_id: EntryId,

    /// The idempotency key this entry was recorded under.
    pub idempotency_key: IdempotencyKey,

    /// The account whose balance is affected.
    pub account_id: AccountId,

    /// Signed amount in credits. Negative = debit.
    pub delta: i64,

    /// Operation name.
    pub reason: String,

    /// What kind of balance change this is.
    pub kind: EntryKind,

    /// Settlement status.
    pub status: EntryStatus,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,

    /// When the entry left `Pending`.
    pub settled_at: Option<DateTime<Utc>>,

    /// The entry this one offsets (compensations only).
    pub compensates: Option<EntryId>,

    /// Stored result of the metered operation, recorded at commit.
    pub result: Option<serde_json::Value>,
}

impl LedgerEntry {
    /// Create a pending charge holding `cost` credits.
    #[must_use]
    pub fn charge(
        account_id: AccountId,
        idempotency_key: IdempotencyKey,
        cost: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: EntryId::generate(),
            idempotency_key,
            account_id,
            delta: -cost.abs(), // Always negative for charges
            reason: reason.into(),
            kind: EntryKind::Charge,
            status: EntryStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
            compensates: None,
            result: None,
        }
    }

    /// Create a committed grant of `amount` credits.
    #[must_use]
    pub fn grant(
        account_id: AccountId,
        idempotency_key: IdempotencyKey,
        amount: i64,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entry_id: EntryId::generate(),
            idempotency_key,
            account_id,
            delta: amount,
            reason: reason.into(),
            kind: EntryKind::Grant,
            status: EntryStatus::Committed,
            created_at: now,
            settled_at: Some(now),
            compensates: None,
            result: None,
        }
    }

    /// Create the compensating entry for a reversed charge.
    ///
    /// The compensation carries the equal and opposite delta and is committed
    /// immediately.
    #[must_use]
    pub fn compensation_for(original: &Self, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: EntryId::generate(),
            idempotency_key: original.idempotency_key.clone(),
            account_id: original.account_id.clone(),
            delta: -original.delta,
            reason: reason.into(),
            kind: EntryKind::Compensation,
            status: EntryStatus::Committed,
            created_at: now,
            settled_at: Some(now),
            compensates: Some(original.entry_id),
            result: None,
        }
    }

    /// Credits held by this entry while it is pending.
    #[must_use]
    pub const fn hold(&self) -> i64 {
        if self.delta < 0 {
            -self.delta
        } else {
            0
        }
    }

    /// Return a committed copy carrying the operation result.
    #[must_use]
    pub fn committed(&self, result: Option<serde_json::Value>) -> Self {
        let mut entry = self.clone();
        entry.status = EntryStatus::Committed;
        entry.settled_at = Some(Utc::now());
        entry.result = result;
        entry
    }

    /// Return a reversed copy.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut entry = self.clone();
        entry.status = EntryStatus::Reversed;
        entry.settled_at = Some(Utc::now());
        entry
    }
}

/// Type of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Credits held and then spent by a metered operation.
    Charge,

    /// Credits added to the account (plan purchase, top-up, bonus).
    Grant,

    /// Offsets a reversed charge.
    Compensation,
}

/// Settlement status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Reserved, not yet applied to the balance.
    Pending,

    /// Applied to the balance.
    Committed,

    /// Released without being applied.
    Reversed,
}

impl EntryStatus {
    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::Reversed => "reversed",
        }
    }
}
