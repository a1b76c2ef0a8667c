//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const ENTRIES: &str = "entries";

    /// Index: entries by account, keyed by `len(account_id) || account_id || entry_id`.
    /// Value is empty (index only).
    pub const ENTRIES_BY_ACCOUNT: &str = "entries_by_account";

    /// Idempotency key index, keyed by key, value is the head `entry_id`.
    pub const IDEMPOTENCY_KEYS: &str = "idempotency_keys";

    /// Index: pending entries, keyed by `entry_id`. Value is empty.
    pub const PENDING_ENTRIES: &str = "pending_entries";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::ENTRIES,
        cf::ENTRIES_BY_ACCOUNT,
        cf::IDEMPOTENCY_KEYS,
        cf::PENDING_ENTRIES,
    ]
}
