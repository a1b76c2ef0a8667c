//! Core types for copyforge.
//!
//! This crate provides the foundational types used throughout copyforge:
//!
//! - **Identifiers**: `AccountId`, `IdempotencyKey`, `EntryId`
//! - **Accounts**: `Account`, `Plan`
//! - **Ledger**: `LedgerEntry`, `EntryKind`, `EntryStatus`
//! - **Operations**: `MeteredOperation`, `OperationKind`, `OperationPricing`
//!
//! # Credit Unit
//!
//! Balances and costs are integer credits stored as `i64`. A charge is a
//! negative delta, a grant a positive one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod entry;
pub mod error;
pub mod ids;
pub mod operation;

pub use account::{
    Account, Plan, BASIC_PLAN_CREDITS, LOW_BALANCE_THRESHOLD, PRO_PLAN_CREDITS,
};
pub use entry::{EntryKind, EntryStatus, LedgerEntry};
pub use error::{CoreError, Result};
pub use ids::{AccountId, EntryId, IdError, IdempotencyKey};
pub use operation::{
    MeteredOperation, OperationKind, OperationPricing, DEFAULT_GENERATE_CONTENT_COST,
};
