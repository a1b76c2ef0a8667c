//! Conditional write sets.
//!
//! A `WriteSet` bundles everything one ledger transition changes: the account
//! record, the idempotency-key index, and the entries. Backends apply it
//! all-or-nothing, and only if its preconditions still hold.

use copyforge_core::{Account, EntryId, EntryStatus, IdempotencyKey, LedgerEntry};

use crate::error::{Result, StoreError};

/// The new account state and the version it was derived from.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    /// Account state to store.
    pub account: Account,

    /// Version the stored account must have. `None` means the account must
    /// not exist yet.
    pub expected_version: Option<u64>,
}

/// Moves an idempotency key to a new head entry.
#[derive(Debug, Clone)]
pub struct KeyWrite {
    /// The key being written.
    pub key: IdempotencyKey,

    /// Head the key must currently point at. `None` means the key must be unused.
    pub expected_head: Option<EntryId>,

    /// Entry the key points at after the write.
    pub new_head: EntryId,
}

/// An atomic, conditional ledger write.
#[derive(Debug, Clone)]
pub struct WriteSet {
    /// Account update.
    pub account: AccountWrite,

    /// Key index update, if the transition touches one.
    pub key: Option<KeyWrite>,

    /// Entries to insert or overwrite.
    pub entries: Vec<LedgerEntry>,
}

impl WriteSet {
    /// A write that only creates or updates the account record.
    #[must_use]
    pub fn account_only(account: Account, expected_version: Option<u64>) -> Self {
        Self {
            account: AccountWrite {
                account,
                expected_version,
            },
            key: None,
            entries: Vec::new(),
        }
    }

    /// Check the preconditions against the currently stored state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the account version or the key head
    /// moved since the writer read them.
    pub fn check(&self, stored: Option<&Account>, stored_head: Option<EntryId>) -> Result<()> {
        let account_id = &self.account.account.account_id;
        match (self.account.expected_version, stored) {
            (None, Some(_)) => {
                return Err(StoreError::Conflict(format!(
                    "account {account_id} already exists"
                )));
            }
            (Some(expected), None) => {
                return Err(StoreError::Conflict(format!(
                    "account {account_id} missing, expected version {expected}"
                )));
            }
            (Some(expected), Some(current)) if current.version != expected => {
                return Err(StoreError::Conflict(format!(
                    "account {account_id} at version {}, expected {expected}",
                    current.version
                )));
            }
            _ => {}
        }

        if let Some(key) = &self.key {
            if key.expected_head != stored_head {
                return Err(StoreError::Conflict(format!(
                    "idempotency key {} moved",
                    key.key
                )));
            }
        }

        Ok(())
    }

    /// Entries in this write that are pending after it is applied.
    pub fn pending_entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Pending)
    }
}
