//! Back-references carried by immutable records.
//!
//! Ledger entries and stock movements never change once written, so each one
//! carries the reference of the operation that produced it for audit.

use serde::{Deserialize, Serialize};

use crate::id::TransactionId;

/// What kind of operation an immutable record points back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Transaction,
    StockAdjustment,
    StockTransfer,
}

/// Reference from an immutable record to its originating operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub id: String,
}

impl Reference {
    pub fn transaction(id: TransactionId) -> Self {
        Self {
            kind: ReferenceKind::Transaction,
            id: id.to_string(),
        }
    }

    pub fn stock_adjustment(id: impl ToString) -> Self {
        Self {
            kind: ReferenceKind::StockAdjustment,
            id: id.to_string(),
        }
    }

    pub fn stock_transfer(id: impl ToString) -> Self {
        Self {
            kind: ReferenceKind::StockTransfer,
            id: id.to_string(),
        }
    }
}
