//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use copyforge_core::{AccountId, EntryId, IdempotencyKey};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create an entry key from an entry ID.
#[must_use]
pub fn entry_key(entry_id: &EntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a prefix for iterating all entries for an account.
///
/// Format: `len (1 byte) || account_id`
///
/// The length byte keeps one account's prefix from matching another account
/// whose ID extends it.
#[must_use]
pub fn account_entries_prefix(account_id: &AccountId) -> Vec<u8> {
    let bytes = account_id.as_bytes();
    let mut prefix = Vec::with_capacity(1 + bytes.len());
    // AccountId is at most 128 bytes.
    prefix.push(u8::try_from(bytes.len()).unwrap_or(u8::MAX));
    prefix.extend_from_slice(bytes);
    prefix
}

/// Create an account-entry index key.
///
/// Format: `len (1 byte) || account_id || entry_id (16 bytes)`
///
/// Since ULIDs are time-ordered, entries for an account are sorted by time.
#[must_use]
pub fn account_entry_key(account_id: &AccountId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = account_entries_prefix(account_id);
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Extract the entry ID from the trailing 16 bytes of an index key.
///
/// Returns `None` if the key is shorter than 16 bytes.
#[must_use]
pub fn extract_entry_id(key: &[u8]) -> Option<EntryId> {
    let start = key.len().checked_sub(16)?;
    let bytes: [u8; 16] = key[start..].try_into().ok()?;
    Some(EntryId::from_bytes(bytes))
}

/// Create an idempotency key index key.
#[must_use]
pub fn idempotency_key(key: &IdempotencyKey) -> Vec<u8> {
    key.as_bytes().to_vec()
}
