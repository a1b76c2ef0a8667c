//! Credit metering for copyforge.
//!
//! - [`Ledger`]: per-account balances and the append-only entry trail
//! - [`Gateway`]: wraps a unit of work in reserve, execute, settle
//! - [`ReconciliationSink`]: where settlement failures are reported
//!
//! Callers outside this crate go through [`Gateway::perform`] for metered
//! work. The ledger is exposed for account management (opening accounts,
//! grants, history).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use copyforge_core::{AccountId, IdempotencyKey, MeteredOperation};
//! use copyforge_metering::{Gateway, Ledger};
//! use copyforge_store::MemoryStore;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Ledger::new(Arc::new(MemoryStore::new()))?;
//! let gateway = Gateway::new(ledger);
//!
//! let account_id: AccountId = "user-1".parse()?;
//! let operation = MeteredOperation::new("generate_content", 10, IdempotencyKey::generate())?;
//! let text: String = gateway
//!     .perform(&account_id, &operation, || async {
//!         Ok::<_, std::io::Error>("hello".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod gateway;
pub mod ledger;
pub mod reconciliation;

#[cfg(test)]
mod testing;

pub use gateway::{Gateway, GatewayError};
pub use ledger::{Ledger, LedgerError, ReservationResult, MAX_WRITE_ATTEMPTS};
pub use reconciliation::{ReconciliationEvent, ReconciliationKind, ReconciliationSink};
