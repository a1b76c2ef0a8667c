//! The metered operation gateway.
//!
//! [`Gateway::perform`] runs a unit of work between a reservation and its
//! settlement:
//!
//! 1. reserve the operation's cost
//! 2. run the work
//! 3. commit on success, release on failure
//!
//! Once a reservation is held a [`SettlementGuard`] owns it. If the caller
//! drops the `perform` future, or the work panics, the guard's `Drop` spawns
//! the settlement that was due onto the current tokio runtime.

use std::fmt::Display;
use std::future::Future;

use copyforge_core::{AccountId, EntryId, IdempotencyKey, MeteredOperation};
use copyforge_store::LedgerStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ledger::{Ledger, LedgerError, ReservationResult};
use crate::reconciliation::{ReconciliationEvent, ReconciliationKind, ReconciliationSink};

/// Errors from [`Gateway::perform`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError<E> {
    /// The account cannot cover the operation. The work did not run.
    #[error("insufficient credits: {available} available, {required} required")]
    InsufficientFunds {
        /// Credits available after outstanding reservations.
        available: i64,
        /// Credits the operation costs.
        required: i64,
    },

    /// Another call with the same idempotency key is still running.
    #[error("operation {key} is already in flight")]
    DuplicateInFlight {
        /// The contended key.
        key: IdempotencyKey,
    },

    /// The key already completed but its result is not available.
    #[error("operation already completed as entry {entry_id}")]
    AlreadyCompleted {
        /// The committed entry.
        entry_id: EntryId,
    },

    /// The reservation failed. The work did not run.
    #[error("ledger error: {0}")]
    Ledger(#[source] LedgerError),

    /// The work itself failed. The reservation was released.
    #[error("operation failed: {0}")]
    Operation(E),
}

/// Settlement owed for a held reservation.
#[derive(Debug, Clone)]
enum Settlement {
    Commit(Option<serde_json::Value>),
    Release(String),
}

/// Owns a reservation until it is settled.
struct SettlementGuard<S: LedgerStore + ?Sized + 'static> {
    ledger: Ledger<S>,
    sink: ReconciliationSink,
    account_id: AccountId,
    key: IdempotencyKey,
    due: Option<Settlement>,
}

impl<S: LedgerStore + ?Sized + 'static> SettlementGuard<S> {
    fn new(
        ledger: Ledger<S>,
        sink: ReconciliationSink,
        account_id: AccountId,
        key: IdempotencyKey,
    ) -> Self {
        Self {
            ledger,
            sink,
            account_id,
            key,
            due: Some(Settlement::Release("operation cancelled".into())),
        }
    }

    fn owe(&mut self, settlement: Settlement) {
        self.due = Some(settlement);
    }

    fn event(&self, kind: ReconciliationKind, detail: impl Into<String>) -> ReconciliationEvent {
        ReconciliationEvent::new(self.account_id.clone(), self.key.clone(), kind, detail)
    }

    /// Run the owed settlement now and disarm.
    ///
    /// The settlement stays owed until it returns, so if this future is
    /// dropped mid-write `Drop` runs it again in the background.
    async fn settle(&mut self) {
        let Some(settlement) = self.due.clone() else {
            return;
        };
        let outcome = run_settlement(&self.ledger, &self.key, &settlement).await;
        self.due = None;
        if let Err((kind, err)) = outcome {
            self.sink.report(self.event(kind, err.to_string()));
        }
    }
}

impl<S: LedgerStore + ?Sized + 'static> Drop for SettlementGuard<S> {
    fn drop(&mut self) {
        let Some(settlement) = self.due.take() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.sink.report(self.event(
                ReconciliationKind::SettlementAbandoned,
                format!("no runtime to run {settlement:?}"),
            ));
            return;
        };

        warn!(
            account_id = %self.account_id,
            key = %self.key,
            "Reservation dropped unsettled, settling in background"
        );

        let ledger = self.ledger.clone();
        let sink = self.sink.clone();
        let account_id = self.account_id.clone();
        let key = self.key.clone();
        handle.spawn(async move {
            if let Err((kind, err)) = run_settlement(&ledger, &key, &settlement).await {
                sink.report(ReconciliationEvent::new(account_id, key, kind, err.to_string()));
            }
        });
    }
}

async fn run_settlement<S: LedgerStore + ?Sized>(
    ledger: &Ledger<S>,
    key: &IdempotencyKey,
    settlement: &Settlement,
) -> Result<(), (ReconciliationKind, LedgerError)> {
    match settlement {
        Settlement::Commit(result) => ledger
            .commit(key, result.clone())
            .await
            .map_err(|e| (ReconciliationKind::CommitFailed, e)),
        Settlement::Release(reason) => ledger
            .release(key, reason)
            .await
            .map_err(|e| (ReconciliationKind::ReleaseFailed, e)),
    }
}

/// Runs metered work against a [`Ledger`].
pub struct Gateway<S: LedgerStore + ?Sized + 'static = dyn LedgerStore> {
    ledger: Ledger<S>,
    sink: ReconciliationSink,
}

impl<S: LedgerStore + ?Sized + 'static> Clone for Gateway<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S: LedgerStore + ?Sized + 'static> Gateway<S> {
    /// Create a gateway that logs reconciliation events.
    #[must_use]
    pub fn new(ledger: Ledger<S>) -> Self {
        Self {
            ledger,
            sink: ReconciliationSink::log_only(),
        }
    }

    /// Report reconciliation events to `sink`.
    #[must_use]
    pub fn with_reconciliation(mut self, sink: ReconciliationSink) -> Self {
        self.sink = sink;
        self
    }

    /// The ledger this gateway settles against.
    #[must_use]
    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    /// Reserve, run `execute`, then settle.
    ///
    /// - A key that already committed returns the stored result without
    ///   running `execute`.
    /// - If `execute` succeeds its result is returned even when the commit
    ///   fails; the failure is reported as a reconciliation event.
    /// - If `execute` fails the reservation is released and the original
    ///   error returned, whatever the release outcome.
    ///
    /// # Errors
    ///
    /// - `InsufficientFunds` if the account cannot cover the cost
    /// - `DuplicateInFlight` if the key is reserved by a running call
    /// - `AlreadyCompleted` if the key committed without a usable stored result
    /// - `Ledger` if the reservation itself failed
    /// - `Operation` with the error returned by `execute`
    pub async fn perform<T, E, F, Fut>(
        &self,
        account_id: &AccountId,
        operation: &MeteredOperation,
        execute: F,
    ) -> Result<T, GatewayError<E>>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = &operation.idempotency_key;
        let reservation = self
            .ledger
            .reserve(account_id, operation)
            .await
            .map_err(GatewayError::Ledger)?;

        let mut guard = match reservation {
            ReservationResult::InsufficientFunds {
                available,
                required,
            } => {
                return Err(GatewayError::InsufficientFunds {
                    available,
                    required,
                });
            }
            ReservationResult::InProgress => {
                return Err(GatewayError::DuplicateInFlight { key: key.clone() });
            }
            ReservationResult::AlreadyCommitted { entry_id, result } => {
                return replay(entry_id, result);
            }
            ReservationResult::Exempt => {
                debug!(account_id = %account_id, key = %key, "Exempt plan, running unmetered");
                None
            }
            ReservationResult::Reserved { .. } => Some(SettlementGuard::new(
                self.ledger.clone(),
                self.sink.clone(),
                account_id.clone(),
                key.clone(),
            )),
        };

        match execute().await {
            Ok(value) => {
                if let Some(guard) = guard.as_mut() {
                    let stored = match serde_json::to_value(&value) {
                        Ok(v) => Some(v),
                        Err(e) => {
                            warn!(key = %key, error = %e, "Result not serializable, committing without it");
                            None
                        }
                    };
                    guard.owe(Settlement::Commit(stored));
                    guard.settle().await;
                }
                Ok(value)
            }
            Err(err) => {
                if let Some(guard) = guard.as_mut() {
                    guard.owe(Settlement::Release(err.to_string()));
                    guard.settle().await;
                }
                Err(GatewayError::Operation(err))
            }
        }
    }
}

fn replay<T: DeserializeOwned, E>(
    entry_id: EntryId,
    result: Option<serde_json::Value>,
) -> Result<T, GatewayError<E>> {
    let Some(value) = result else {
        return Err(GatewayError::AlreadyCompleted { entry_id });
    };
    match serde_json::from_value(value) {
        Ok(value) => {
            info!(entry_id = %entry_id, "Replayed committed result");
            Ok(value)
        }
        Err(e) => {
            warn!(entry_id = %entry_id, error = %e, "Stored result does not match, not replaying");
            Err(GatewayError::AlreadyCompleted { entry_id })
        }
    }
}
