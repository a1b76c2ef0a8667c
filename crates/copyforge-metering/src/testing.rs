//! Test doubles shared by the ledger and gateway tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copyforge_core::{
    Account, AccountId, EntryId, IdempotencyKey, LedgerEntry, MeteredOperation, Plan,
};
use copyforge_store::{LedgerStore, MemoryStore, Result, StoreCapabilities, StoreError, WriteSet};
use tokio::sync::{Barrier, Notify};

use crate::Ledger;

/// A `MemoryStore` whose writes can be made to conflict, fail or stall.
pub struct FlakyStore {
    inner: MemoryStore,
    conflicts: AtomicUsize,
    unavailable: AtomicBool,
    atomic: bool,
    holding: AtomicBool,
    write_held: Notify,
    writes_resumed: Notify,
    key_reads: Mutex<Option<(usize, Arc<Barrier>)>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            conflicts: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            atomic: true,
            holding: AtomicBool::new(false),
            write_held: Notify::new(),
            writes_resumed: Notify::new(),
            key_reads: Mutex::new(None),
        }
    }

    pub fn without_atomic_writes() -> Self {
        Self {
            atomic: false,
            ..Self::new()
        }
    }

    /// Make the next `n` writes fail with `Conflict`.
    pub fn inject_conflicts(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// Make every write fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes wait until `resume_writes`.
    pub fn hold_writes(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    /// Wait until a write is stalled by `hold_writes`.
    pub async fn wait_for_held_write(&self) {
        self.write_held.notified().await;
    }

    pub fn resume_writes(&self) {
        self.holding.store(false, Ordering::SeqCst);
        self.writes_resumed.notify_waiters();
    }

    /// Make the next `n` key-head reads wait for each other after reading,
    /// so all of them see the head as it was before any of them writes.
    pub fn sync_key_reads(&self, n: usize) {
        *self.key_reads.lock().unwrap() = Some((n, Arc::new(Barrier::new(n))));
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            conditional_writes: self.atomic,
            transactions: self.atomic,
        }
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.inner.get_account(account_id).await
    }

    async fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        self.inner.get_entry(entry_id).await
    }

    async fn get_entry_by_key(&self, key: &IdempotencyKey) -> Result<Option<LedgerEntry>> {
        let head = self.inner.get_entry_by_key(key).await?;
        let barrier = {
            let mut slot = self.key_reads.lock().unwrap();
            match slot.as_mut() {
                Some((remaining, barrier)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(Arc::clone(barrier))
                }
                _ => None,
            }
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(head)
    }

    async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        self.inner.list_entries(account_id, limit, offset).await
    }

    async fn list_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        self.inner.list_pending(older_than).await
    }

    async fn apply(&self, write: WriteSet) -> Result<()> {
        if self.holding.load(Ordering::SeqCst) {
            let resumed = self.writes_resumed.notified();
            self.write_held.notify_one();
            resumed.await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining.saturating_sub(1), Ordering::SeqCst);
            return Err(StoreError::Conflict("injected conflict".into()));
        }
        self.inner.apply(write).await
    }
}

/// A ledger with one account on `plan` holding exactly `balance` credits.
pub async fn funded_ledger(plan: Plan, balance: i64) -> (Ledger<FlakyStore>, AccountId) {
    let store = Arc::new(FlakyStore::new());
    let mut account = Account::new(AccountId::generate(), plan);
    account.balance = balance;
    store
        .apply(WriteSet::account_only(account.clone(), None))
        .await
        .unwrap();
    (Ledger::new(store).unwrap(), account.account_id)
}

pub fn key(s: &str) -> IdempotencyKey {
    s.parse().unwrap()
}

pub fn operation(k: &str, cost: i64) -> MeteredOperation {
    MeteredOperation::new("generate_content", cost, key(k)).unwrap()
}
