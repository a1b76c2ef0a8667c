//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `LedgerStore` trait.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use copyforge_core::{Account, AccountId, EntryId, EntryStatus, IdempotencyKey, LedgerEntry};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::write::WriteSet;
use crate::{LedgerStore, StoreCapabilities};

/// RocksDB-backed storage implementation.
///
/// Conditional writes are serialized through `write_lock`: the precondition
/// read and the `WriteBatch` commit happen while it is held, so no other
/// writer in the process can interleave.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .get_cf(&cf, keys::account_key(account_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(cf::ENTRIES)?;
        self.db
            .get_cf(&cf, keys::entry_key(entry_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_head(&self, key: &IdempotencyKey) -> Result<Option<EntryId>> {
        let cf = self.cf(cf::IDEMPOTENCY_KEYS)?;
        let value = self
            .db
            .get_cf(&cf, keys::idempotency_key(key))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match value {
            None => Ok(None),
            Some(bytes) => keys::extract_entry_id(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Serialization(format!("corrupt key head for {key}"))),
        }
    }
}

#[async_trait]
impl LedgerStore for RocksStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            conditional_writes: true,
            transactions: false,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.read_account(account_id)
    }

    async fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        self.read_entry(entry_id)
    }

    async fn get_entry_by_key(&self, key: &IdempotencyKey) -> Result<Option<LedgerEntry>> {
        match self.read_head(key)? {
            Some(entry_id) => self.read_entry(&entry_id),
            None => Ok(None),
        }
    }

    async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let cf_by_account = self.cf(cf::ENTRIES_BY_ACCOUNT)?;
        let prefix = keys::account_entries_prefix(account_id);

        // Collect all matching keys first (ULIDs are naturally time-ordered)
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_by_account, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }

        let mut entries = Vec::new();
        for key in all_keys.iter().rev().skip(offset).take(limit) {
            let Some(entry_id) = keys::extract_entry_id(key) else {
                continue;
            };
            if let Some(entry) = self.read_entry(&entry_id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    async fn list_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let cf_pending = self.cf(cf::PENDING_ENTRIES)?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf_pending, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let Some(entry_id) = keys::extract_entry_id(&key) else {
                continue;
            };
            let Some(entry) = self.read_entry(&entry_id)? else {
                continue;
            };
            // Pending keys are ULIDs, so everything after this is newer.
            if entry.created_at > older_than {
                break;
            }
            entries.push(entry);
        }

        Ok(entries)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    async fn apply(&self, write: WriteSet) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))?;

        let account_id = &write.account.account.account_id;
        let stored = self.read_account(account_id)?;
        let stored_head = match &write.key {
            Some(k) => self.read_head(&k.key)?,
            None => None,
        };
        write.check(stored.as_ref(), stored_head)?;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_entries = self.cf(cf::ENTRIES)?;
        let cf_by_account = self.cf(cf::ENTRIES_BY_ACCOUNT)?;
        let cf_keys = self.cf(cf::IDEMPOTENCY_KEYS)?;
        let cf_pending = self.cf(cf::PENDING_ENTRIES)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(account_id),
            Self::serialize(&write.account.account)?,
        );

        for entry in &write.entries {
            let entry_key = keys::entry_key(&entry.entry_id);
            batch.put_cf(&cf_entries, &entry_key, Self::serialize(entry)?);
            batch.put_cf(
                &cf_by_account,
                keys::account_entry_key(&entry.account_id, &entry.entry_id),
                [], // Index entry (empty value)
            );
            if entry.status == EntryStatus::Pending {
                batch.put_cf(&cf_pending, &entry_key, []);
            } else {
                batch.delete_cf(&cf_pending, &entry_key);
            }
        }

        if let Some(key) = &write.key {
            batch.put_cf(
                &cf_keys,
                keys::idempotency_key(&key.key),
                keys::entry_key(&key.new_head),
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(
            account_id = %account_id,
            version = write.account.account.version,
            entries = write.entries.len(),
            "Applied ledger write"
        );

        Ok(())
    }
}
