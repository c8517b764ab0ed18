//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// This is a closed taxonomy: callers match on it exhaustively instead of
/// inspecting messages. Keep it focused on deterministic business failures
/// (validation, invariants, conflicts). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (bad or missing input).
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A quantity or pack-size argument was out of range.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A tax code is unknown (or not yet active at the document date).
    #[error("unknown tax code: {0}")]
    UnknownTaxCode(String),

    /// A tax rate is negative, or above 100% on the capped path.
    #[error("invalid tax rate: {0}")]
    InvalidRate(Decimal),

    /// The strict stock path refused to go below zero.
    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },

    /// A requested return exceeds what is still returnable for the item.
    #[error("cannot return {requested} of item {item_id}: only {returnable} returnable")]
    OverReturn {
        item_id: String,
        requested: i64,
        returnable: i64,
    },

    /// A return referenced an item absent from the original transaction.
    #[error("item {item_id} is not part of the original transaction")]
    ItemNotInOriginalTransaction { item_id: String },

    /// A ledger batch failed the debit = credit invariant. This is an
    /// internal bug, never a recoverable caller error: the enclosing unit
    /// of work must be rolled back whole.
    #[error("ledger batch out of balance: debits {debits}, credits {credits}")]
    LedgerImbalance { debits: Decimal, credits: Decimal },

    /// Optimistic concurrency retries were exhausted; the caller may retry.
    #[error("concurrency conflict persisted after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// True for errors a caller can fix by changing the request.
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            Self::LedgerImbalance { .. }
                | Self::InvariantViolation(_)
                | Self::ConcurrencyConflict { .. }
        )
    }
}
