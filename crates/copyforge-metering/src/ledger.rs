//! The credit ledger.
//!
//! Every transition is an optimistic transaction: read the account and the
//! idempotency-key head, decide, then apply one conditional `WriteSet`. If
//! another writer got there first the store answers `Conflict` and the
//! transition is re-run against fresh state.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use copyforge_core::{
    Account, AccountId, EntryId, EntryStatus, IdempotencyKey, LedgerEntry, MeteredOperation, Plan,
};
use copyforge_store::{AccountWrite, KeyWrite, LedgerStore, StoreError, WriteSet};
use tracing::{debug, info, warn};

/// Attempts per transition before giving up with `LedgerError::Contention`.
pub const MAX_WRITE_ATTEMPTS: usize = 8;

/// Outcome of [`Ledger::reserve`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationResult {
    /// A pending entry now holds the cost.
    Reserved {
        /// The new pending entry.
        entry_id: EntryId,
    },

    /// The key already completed. The work must not run again.
    AlreadyCommitted {
        /// The committed entry.
        entry_id: EntryId,
        /// Result stored at commit, if any.
        result: Option<serde_json::Value>,
    },

    /// Another reservation under this key is still pending.
    InProgress,

    /// The account's plan is not debited. Nothing was written.
    Exempt,

    /// Not enough available credits.
    InsufficientFunds {
        /// Credits available after outstanding reservations.
        available: i64,
        /// Credits the operation costs.
        required: i64,
    },
}

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No entry is recorded under the idempotency key.
    #[error("no ledger entry for idempotency key {0}")]
    NotFound(IdempotencyKey),

    /// The entry was released and cannot be committed.
    #[error("ledger entry {0} was already reversed")]
    AlreadyReversed(EntryId),

    /// The entry was committed and cannot be released.
    #[error("ledger entry {0} was already committed")]
    AlreadyCommitted(EntryId),

    /// The account does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// A cost or grant amount is out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The idempotency key was already used by a different account.
    #[error("idempotency key {0} belongs to another account")]
    KeyConflict(IdempotencyKey),

    /// The store offers no way to reserve atomically.
    #[error("store supports neither conditional writes nor transactions")]
    UnsupportedStore,

    /// Every attempt lost a write race.
    #[error("ledger write abandoned after {0} conflicting attempts")]
    Contention(usize),

    /// Storage failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Whether the failure comes from the backing store rather than the request.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Contention(_))
    }

    const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

/// Per-account credit ledger over a [`LedgerStore`].
///
/// Cheap to clone; clones share the store.
pub struct Ledger<S: LedgerStore + ?Sized = dyn LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore + ?Sized> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore + ?Sized> Ledger<S> {
    /// Create a ledger over `store`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnsupportedStore` if the store can neither make
    /// writes conditional nor run a read and a write in one transaction.
    pub fn new(store: Arc<S>) -> Result<Self, LedgerError> {
        if !store.capabilities().supports_atomic_reserve() {
            return Err(LedgerError::UnsupportedStore);
        }
        Ok(Self { store })
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        for n in 1..=MAX_WRITE_ATTEMPTS {
            match attempt().await {
                Err(e) if e.is_conflict() => {
                    debug!(op, attempt = n, error = %e, "Ledger write conflict, retrying");
                }
                other => return other,
            }
        }
        warn!(op, attempts = MAX_WRITE_ATTEMPTS, "Ledger write abandoned");
        Err(LedgerError::Contention(MAX_WRITE_ATTEMPTS))
    }

    async fn load_account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))
    }

    async fn load_head(&self, key: &IdempotencyKey) -> Result<LedgerEntry, LedgerError> {
        self.store
            .get_entry_by_key(key)
            .await?
            .ok_or_else(|| LedgerError::NotFound(key.clone()))
    }

    // =========================================================================
    // Metered operations
    // =========================================================================

    /// Reserve the cost of `operation` against the account.
    ///
    /// The check and the pending entry are written atomically, conditional on
    /// the account version and the key head that were read.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if the cost is negative
    /// - `AccountNotFound` if the account does not exist
    /// - `KeyConflict` if another account already used the key
    /// - `Contention` or `Store` on storage failure
    pub async fn reserve(
        &self,
        account_id: &AccountId,
        operation: &MeteredOperation,
    ) -> Result<ReservationResult, LedgerError> {
        if operation.cost < 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "cost must be non-negative, got {}",
                operation.cost
            )));
        }

        let result = self
            .with_retry("reserve", move || self.try_reserve(account_id, operation))
            .await?;

        debug!(
            account_id = %account_id,
            key = %operation.idempotency_key,
            cost = operation.cost,
            result = ?result,
            "Reservation decided"
        );
        Ok(result)
    }

    async fn try_reserve(
        &self,
        account_id: &AccountId,
        operation: &MeteredOperation,
    ) -> Result<ReservationResult, LedgerError> {
        let key = &operation.idempotency_key;
        let head = self.store.get_entry_by_key(key).await?;

        if let Some(head) = &head {
            if head.account_id != *account_id {
                return Err(LedgerError::KeyConflict(key.clone()));
            }
            match head.status {
                EntryStatus::Committed => {
                    return Ok(ReservationResult::AlreadyCommitted {
                        entry_id: head.entry_id,
                        result: head.result.clone(),
                    });
                }
                EntryStatus::Pending => return Ok(ReservationResult::InProgress),
                // A released attempt may be retried under the same key.
                EntryStatus::Reversed => {}
            }
        }

        let account = self.load_account(account_id).await?;
        if account.is_exempt() {
            return Ok(ReservationResult::Exempt);
        }
        if !account.can_reserve(operation.cost) {
            return Ok(ReservationResult::InsufficientFunds {
                available: account.available(),
                required: operation.cost,
            });
        }

        let entry = LedgerEntry::charge(
            account_id.clone(),
            key.clone(),
            operation.cost,
            operation.reason.clone(),
        );
        let entry_id = entry.entry_id;

        let mut next = account.next_version();
        next.reserved += entry.hold();

        self.store
            .apply(WriteSet {
                account: AccountWrite {
                    account: next,
                    expected_version: Some(account.version),
                },
                key: Some(KeyWrite {
                    key: key.clone(),
                    expected_head: head.map(|h| h.entry_id),
                    new_head: entry_id,
                }),
                entries: vec![entry],
            })
            .await?;

        Ok(ReservationResult::Reserved { entry_id })
    }

    /// Commit the pending entry under `key`, applying its delta to the balance.
    ///
    /// `result` is stored on the entry so a replay of the key can return it.
    /// Committing an already committed entry is a no-op. If the account's
    /// plan is no longer metered the entry is committed together with a
    /// compensation and the balance is left alone.
    ///
    /// # Errors
    ///
    /// - `NotFound` if nothing is recorded under the key
    /// - `AlreadyReversed` if the entry was released
    /// - `Contention` or `Store` on storage failure
    pub async fn commit(
        &self,
        key: &IdempotencyKey,
        result: Option<serde_json::Value>,
    ) -> Result<(), LedgerError> {
        self.with_retry("commit", move || self.try_commit(key, result.clone()))
            .await
    }

    async fn try_commit(
        &self,
        key: &IdempotencyKey,
        result: Option<serde_json::Value>,
    ) -> Result<(), LedgerError> {
        let head = self.load_head(key).await?;
        match head.status {
            EntryStatus::Committed => return Ok(()),
            EntryStatus::Reversed => return Err(LedgerError::AlreadyReversed(head.entry_id)),
            EntryStatus::Pending => {}
        }

        let account = self.load_account(&head.account_id).await?;
        let cost = head.hold();

        let mut next = account.next_version();
        next.reserved -= cost;

        let committed = head.committed(result);
        let entries = if account.is_exempt() {
            // The plan stopped being metered while the charge was held.
            let waiver = LedgerEntry::compensation_for(&committed, "plan is not metered");
            vec![committed, waiver]
        } else {
            next.balance += head.delta;
            next.lifetime_used += cost;
            vec![committed]
        };

        self.store
            .apply(WriteSet {
                account: AccountWrite {
                    account: next,
                    expected_version: Some(account.version),
                },
                key: Some(KeyWrite {
                    key: key.clone(),
                    expected_head: Some(head.entry_id),
                    new_head: head.entry_id,
                }),
                entries,
            })
            .await?;

        info!(
            account_id = %head.account_id,
            key = %key,
            entry_id = %head.entry_id,
            cost,
            waived = account.is_exempt(),
            "Committed charge"
        );
        Ok(())
    }

    /// Release the pending entry under `key` without touching the balance.
    ///
    /// The entry is marked reversed and a committed compensation with the
    /// opposite delta is appended. Releasing an already reversed entry is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// - `NotFound` if nothing is recorded under the key
    /// - `AlreadyCommitted` if the entry was committed
    /// - `Contention` or `Store` on storage failure
    pub async fn release(&self, key: &IdempotencyKey, reason: &str) -> Result<(), LedgerError> {
        self.with_retry("release", move || self.try_release(key, reason))
            .await
    }

    async fn try_release(&self, key: &IdempotencyKey, reason: &str) -> Result<(), LedgerError> {
        let head = self.load_head(key).await?;
        match head.status {
            EntryStatus::Reversed => return Ok(()),
            EntryStatus::Committed => return Err(LedgerError::AlreadyCommitted(head.entry_id)),
            EntryStatus::Pending => {}
        }

        let account = self.load_account(&head.account_id).await?;
        let mut next = account.next_version();
        next.reserved -= head.hold();

        let reversed = head.reversed();
        let compensation = LedgerEntry::compensation_for(&reversed, reason);

        self.store
            .apply(WriteSet {
                account: AccountWrite {
                    account: next,
                    expected_version: Some(account.version),
                },
                key: Some(KeyWrite {
                    key: key.clone(),
                    expected_head: Some(head.entry_id),
                    new_head: head.entry_id,
                }),
                entries: vec![reversed, compensation],
            })
            .await?;

        info!(
            account_id = %head.account_id,
            key = %key,
            entry_id = %head.entry_id,
            reason,
            "Released reservation"
        );
        Ok(())
    }

    // =========================================================================
    // Account management
    // =========================================================================

    /// Open the account on first sight, or move it to `plan`.
    ///
    /// The first time an account is on a plan it is granted that plan's
    /// included credits. Returning to a plan it held before grants nothing.
    ///
    /// # Errors
    ///
    /// Returns `Contention` or `Store` on storage failure.
    pub async fn open_account(
        &self,
        account_id: &AccountId,
        plan: Plan,
    ) -> Result<Account, LedgerError> {
        self.with_retry("open_account", move || self.try_open_account(account_id, plan))
            .await
    }

    async fn try_open_account(
        &self,
        account_id: &AccountId,
        plan: Plan,
    ) -> Result<Account, LedgerError> {
        let stored = self.store.get_account(account_id).await?;

        let (base, expected_version) = match stored {
            Some(account) if account.plan == plan => return Ok(account),
            Some(account) => {
                let mut next = account.next_version();
                next.plan = plan;
                (next, Some(account.version))
            }
            None => (Account::new(account_id.clone(), plan), None),
        };

        let key = plan_grant_key(account_id, plan)?;
        let mut included = plan.included_credits();
        if included > 0 && self.store.get_entry_by_key(&key).await?.is_some() {
            debug!(account_id = %account_id, plan = %plan, "Plan credits already granted");
            included = 0;
        }

        let mut write = WriteSet::account_only(base, expected_version);
        if included > 0 {
            let entry = LedgerEntry::grant(
                account_id.clone(),
                key.clone(),
                included,
                format!("{plan} plan credits"),
            );
            write.account.account.balance += included;
            write.account.account.lifetime_granted += included;
            write.key = Some(KeyWrite {
                key,
                expected_head: None,
                new_head: entry.entry_id,
            });
            write.entries.push(entry);
        }

        let account = write.account.account.clone();
        self.store.apply(write).await?;

        info!(
            account_id = %account_id,
            plan = %plan,
            granted = included,
            created = expected_version.is_none(),
            "Opened account"
        );
        Ok(account)
    }

    /// Get the account, opening it on `plan` if it does not exist yet.
    ///
    /// An existing account keeps its plan.
    ///
    /// # Errors
    ///
    /// Returns `Contention` or `Store` on storage failure.
    pub async fn ensure_account(
        &self,
        account_id: &AccountId,
        plan: Plan,
    ) -> Result<Account, LedgerError> {
        self.with_retry("ensure_account", move || self.try_ensure_account(account_id, plan))
            .await
    }

    async fn try_ensure_account(
        &self,
        account_id: &AccountId,
        plan: Plan,
    ) -> Result<Account, LedgerError> {
        match self.store.get_account(account_id).await? {
            Some(account) => Ok(account),
            None => self.try_open_account(account_id, plan).await,
        }
    }

    /// Credit `amount` to the account under an idempotency key.
    ///
    /// Replaying a key that already granted is a no-op returning the current
    /// account.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not positive
    /// - `AccountNotFound` if the account does not exist
    /// - `KeyConflict` if the key was used by another account or operation
    /// - `Contention` or `Store` on storage failure
    pub async fn grant(
        &self,
        account_id: &AccountId,
        amount: i64,
        key: &IdempotencyKey,
        reason: &str,
    ) -> Result<Account, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "grant must be positive, got {amount}"
            )));
        }
        self.with_retry("grant", move || self.try_grant(account_id, amount, key, reason))
            .await
    }

    async fn try_grant(
        &self,
        account_id: &AccountId,
        amount: i64,
        key: &IdempotencyKey,
        reason: &str,
    ) -> Result<Account, LedgerError> {
        if let Some(head) = self.store.get_entry_by_key(key).await? {
            if head.account_id != *account_id || head.delta <= 0 {
                return Err(LedgerError::KeyConflict(key.clone()));
            }
            debug!(account_id = %account_id, key = %key, "Grant already applied");
            return self.load_account(account_id).await;
        }

        let account = self.load_account(account_id).await?;
        let entry = LedgerEntry::grant(account_id.clone(), key.clone(), amount, reason);

        let mut next = account.next_version();
        next.balance += amount;
        next.lifetime_granted += amount;

        self.store
            .apply(WriteSet {
                account: AccountWrite {
                    account: next.clone(),
                    expected_version: Some(account.version),
                },
                key: Some(KeyWrite {
                    key: key.clone(),
                    expected_head: None,
                    new_head: entry.entry_id,
                }),
                entries: vec![entry],
            })
            .await?;

        info!(account_id = %account_id, key = %key, amount, "Granted credits");
        Ok(next)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Get an account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if the account does not exist.
    pub async fn account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        self.load_account(account_id).await
    }

    /// The latest entry recorded under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the read fails.
    pub async fn head(&self, key: &IdempotencyKey) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.store.get_entry_by_key(key).await?)
    }

    /// List an account's entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the read fails.
    pub async fn entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.list_entries(account_id, limit, offset).await?)
    }

    /// Pending reservations created at or before `older_than`, oldest first.
    ///
    /// These are the candidates for a reconciliation sweep.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the read fails.
    pub async fn stale_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.list_pending(older_than).await?)
    }
}

/// Key for the included-credit grant of `plan`. One per account and plan.
fn plan_grant_key(account_id: &AccountId, plan: Plan) -> Result<IdempotencyKey, LedgerError> {
    format!("plan:{account_id}:{plan}")
        .parse()
        .map_err(|e| LedgerError::InvalidAmount(format!("cannot derive grant key: {e}")))
}
