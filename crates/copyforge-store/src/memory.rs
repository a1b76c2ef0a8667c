//! In-memory storage implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use copyforge_core::{Account, AccountId, EntryId, IdempotencyKey, LedgerEntry};

use crate::error::{Result, StoreError};
use crate::write::WriteSet;
use crate::{LedgerStore, StoreCapabilities};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    entries: BTreeMap<EntryId, LedgerEntry>,
    entries_by_account: BTreeSet<(AccountId, EntryId)>,
    heads: HashMap<IdempotencyKey, EntryId>,
    pending: BTreeSet<EntryId>,
}

/// Process-local store guarded by a single mutex.
///
/// `apply` checks preconditions and writes under the same lock, so it is a
/// read-write transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            conditional_writes: true,
            transactions: true,
        }
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.lock()?.accounts.get(account_id).cloned())
    }

    async fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        Ok(self.lock()?.entries.get(entry_id).cloned())
    }

    async fn get_entry_by_key(&self, key: &IdempotencyKey) -> Result<Option<LedgerEntry>> {
        let inner = self.lock()?;
        Ok(inner
            .heads
            .get(key)
            .and_then(|id| inner.entries.get(id))
            .cloned())
    }

    async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let inner = self.lock()?;
        let first = (account_id.clone(), EntryId::from_bytes([0; 16]));
        let last = (account_id.clone(), EntryId::from_bytes([0xff; 16]));
        Ok(inner
            .entries_by_account
            .range(first..=last)
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|(_, id)| inner.entries.get(id).cloned())
            .collect())
    }

    async fn list_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let inner = self.lock()?;
        Ok(inner
            .pending
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|e| e.created_at <= older_than)
            .cloned()
            .collect())
    }

    async fn apply(&self, write: WriteSet) -> Result<()> {
        let mut inner = self.lock()?;

        let account_id = write.account.account.account_id.clone();
        let stored_head = write
            .key
            .as_ref()
            .and_then(|k| inner.heads.get(&k.key).copied());
        write.check(inner.accounts.get(&account_id), stored_head)?;

        for entry in &write.entries {
            inner
                .entries_by_account
                .insert((entry.account_id.clone(), entry.entry_id));
            if entry.status == copyforge_core::EntryStatus::Pending {
                inner.pending.insert(entry.entry_id);
            } else {
                inner.pending.remove(&entry.entry_id);
            }
            inner.entries.insert(entry.entry_id, entry.clone());
        }
        if let Some(key) = write.key {
            inner.heads.insert(key.key, key.new_head);
        }
        inner.accounts.insert(account_id, write.account.account);

        Ok(())
    }
}
