//! Settlement failures that need out-of-band resolution.
//!
//! When a reservation cannot be settled (the store is down at commit time, or
//! a cancelled request leaves nothing to run the release on) the entry stays
//! `pending`. The gateway reports each case here instead of failing the
//! caller.

use chrono::{DateTime, Utc};
use copyforge_core::{AccountId, IdempotencyKey};
use serde::Serialize;
use tokio::sync::mpsc;

/// What went wrong while settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// The work succeeded but the commit failed. The user was not charged.
    CommitFailed,

    /// The work failed and the release failed. Credits stay held.
    ReleaseFailed,

    /// The request was dropped with no runtime left to settle on.
    SettlementAbandoned,
}

/// A reservation that was left `pending`.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationEvent {
    /// The account the reservation belongs to.
    pub account_id: AccountId,

    /// Key of the pending entry.
    pub idempotency_key: IdempotencyKey,

    /// Failure kind.
    pub kind: ReconciliationKind,

    /// Underlying error.
    pub detail: String,

    /// When the failure was observed.
    pub occurred_at: DateTime<Utc>,
}

impl ReconciliationEvent {
    /// Create an event observed now.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        idempotency_key: IdempotencyKey,
        kind: ReconciliationKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            idempotency_key,
            kind,
            detail: detail.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Destination for reconciliation events.
///
/// Every event is logged at `error`. If a channel is attached the event is
/// also forwarded to it.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationSink {
    tx: Option<mpsc::UnboundedSender<ReconciliationEvent>>,
}

impl ReconciliationSink {
    /// A sink that only logs.
    #[must_use]
    pub fn log_only() -> Self {
        Self::default()
    }

    /// A sink that also forwards events to the returned receiver.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReconciliationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Report an event.
    pub fn report(&self, event: ReconciliationEvent) {
        tracing::error!(
            account_id = %event.account_id,
            key = %event.idempotency_key,
            kind = ?event.kind,
            detail = %event.detail,
            "Reconciliation needed"
        );

        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::warn!("Reconciliation receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_events() {
        let (sink, mut rx) = ReconciliationSink::channel();
        sink.report(ReconciliationEvent::new(
            AccountId::generate(),
            IdempotencyKey::generate(),
            ReconciliationKind::CommitFailed,
            "store unavailable",
        ));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ReconciliationKind::CommitFailed);
        assert_eq!(event.detail, "store unavailable");
    }

    #[test]
    fn log_only_sink_accepts_events() {
        ReconciliationSink::log_only().report(ReconciliationEvent::new(
            AccountId::generate(),
            IdempotencyKey::generate(),
            ReconciliationKind::ReleaseFailed,
            "timeout",
        ));
    }
}
