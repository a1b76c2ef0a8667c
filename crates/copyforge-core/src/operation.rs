//! Metered operations and their prices.

use serde::{Deserialize, Serialize};

use crate::{CoreError, IdempotencyKey};

/// Default cost of generating one piece of content, in credits.
pub const DEFAULT_GENERATE_CONTENT_COST: i64 = 10;

/// A unit of work that costs a fixed number of credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteredOperation {
    /// Operation name, recorded as the ledger entry reason.
    pub reason: String,

    /// Cost in credits.
    pub cost: i64,

    /// Key that makes retries of this operation exactly-once.
    pub idempotency_key: IdempotencyKey,
}

impl MeteredOperation {
    /// Create a new metered operation.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidAmount` if `cost` is negative.
    pub fn new(
        reason: impl Into<String>,
        cost: i64,
        idempotency_key: IdempotencyKey,
    ) -> Result<Self, CoreError> {
        if cost < 0 {
            return Err(CoreError::InvalidAmount(format!(
                "operation cost must be non-negative, got {cost}"
            )));
        }
        Ok(Self {
            reason: reason.into(),
            cost,
            idempotency_key,
        })
    }
}

/// Kinds of metered operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Generate a social-media post from a prompt.
    GenerateContent,
}

impl OperationKind {
    /// Get the operation name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateContent => "generate_content",
        }
    }
}

/// Fixed price per operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPricing {
    /// Credits charged for one content generation.
    pub generate_content: i64,
}

impl OperationPricing {
    /// Cost of one operation of the given kind.
    #[must_use]
    pub const fn cost_of(&self, kind: OperationKind) -> i64 {
        match kind {
            OperationKind::GenerateContent => self.generate_content,
        }
    }

    /// Build the metered operation for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidAmount` if the configured price is negative.
    pub fn operation(
        &self,
        kind: OperationKind,
        idempotency_key: IdempotencyKey,
    ) -> Result<MeteredOperation, CoreError> {
        MeteredOperation::new(kind.as_str(), self.cost_of(kind), idempotency_key)
    }
}

impl Default for OperationPricing {
    fn default() -> Self {
        Self {
            generate_content: DEFAULT_GENERATE_CONTENT_COST,
        }
    }
}
