//! Ledger storage for copyforge.
//!
//! This crate persists accounts and ledger entries behind the `LedgerStore`
//! trait. Two backends are provided:
//!
//! - `MemoryStore`: process-local, for tests and ephemeral runs
//! - `RocksStore`: `RocksDB` with column families (feature `rocksdb-backend`)
//!
//! # Atomicity
//!
//! Every ledger transition is a single `WriteSet` applied with
//! `LedgerStore::apply`. The write is conditional on the account version and
//! the idempotency-key head the caller read, so a caller that loses a race gets
//! `StoreError::Conflict` and re-reads instead of overwriting.
//!
//! # Example
//!
//! ```no_run
//! use copyforge_core::{Account, AccountId, Plan};
//! use copyforge_store::{LedgerStore, MemoryStore, WriteSet};
//!
//! # async fn demo() -> copyforge_store::Result<()> {
//! let store = MemoryStore::new();
//! let account = Account::new(AccountId::generate(), Plan::Basic);
//! store.apply(WriteSet::account_only(account.clone(), None)).await?;
//!
//! let stored = store.get_account(&account.account_id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod write;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;
pub use write::{AccountWrite, KeyWrite, WriteSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use copyforge_core::{Account, AccountId, EntryId, IdempotencyKey, LedgerEntry};

/// Atomicity primitives a backend offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Writes can be made conditional on previously read state.
    pub conditional_writes: bool,

    /// A read and a write can run inside one transaction.
    pub transactions: bool,
}

impl StoreCapabilities {
    /// Whether a reservation can be checked and created atomically.
    #[must_use]
    pub const fn supports_atomic_reserve(&self) -> bool {
        self.conditional_writes || self.transactions
    }
}

/// The storage trait defining all ledger persistence operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g., `RocksDB`, in-memory for testing).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomicity primitives this backend supports.
    fn capabilities(&self) -> StoreCapabilities;

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Get an entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>>;

    /// Get the newest entry recorded under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_entry_by_key(&self, key: &IdempotencyKey) -> Result<Option<LedgerEntry>>;

    /// List entries for an account, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// List pending entries created at or before `older_than`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply a write set atomically if its preconditions hold.
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if the account version or key head moved.
    /// - `StoreError::Database` if the write fails.
    async fn apply(&self, write: WriteSet) -> Result<()>;
}
