//! The persistence seam for the posting pipeline.

use std::sync::Arc;

use thiserror::Error;

use postledger_accounting::LedgerEntry;
use postledger_core::{ItemId, TransactionId, WarehouseId};
use postledger_inventory::{StockLevel, StockMovement};
use postledger_transactions::{Transaction, TransactionKind};

use crate::unit_of_work::UnitOfWork;

/// Storage-level failure.
///
/// These are infrastructure errors, distinct from the domain taxonomy:
/// a [`StoreError::Conflict`] is retryable by re-reading and re-staging,
/// the rest are not.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A staged write was based on a stale read. Re-read and retry.
    #[error("version conflict on {entity} {id}: staged against {staged}, found {current}")]
    Conflict {
        entity: &'static str,
        id: String,
        staged: u64,
        current: u64,
    },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },

    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: String },

    #[error("store lock poisoned")]
    Poisoned,
}

/// A stored record paired with its optimistic-concurrency revision.
///
/// The revision is owned by the store, not the record: it starts at 1 on
/// first commit and bumps on every subsequent write that touches the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: u64,
}

/// Everything the posting pipeline needs from storage.
///
/// Reads return snapshots; the only write path is [`PostingStore::commit`],
/// which applies a whole [`UnitOfWork`] atomically. Implementations must
/// check every staged version against current state and apply nothing on a
/// mismatch.
pub trait PostingStore: Send + Sync {
    fn transaction(&self, id: TransactionId) -> Result<Option<Versioned<Transaction>>, StoreError>;

    /// Every return document referencing `original_id`, cancelled or not.
    fn returns_for(&self, original_id: TransactionId) -> Result<Vec<Transaction>, StoreError>;

    /// Current level for an item + location; an empty level (balance zero,
    /// version zero) if nothing has been written yet.
    fn stock_level(
        &self,
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<StockLevel, StoreError>;

    /// Append-only movement history for an item, in commit order.
    fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>, StoreError>;

    /// Ledger entries for one account code, in commit order.
    fn entries_for_account(&self, account_code: &str) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Allocate the next human-readable reference for `kind` (e.g.
    /// `INV-000042`). Sequences are per prefix and never reused; a reference
    /// consumed by an aborted posting leaves a gap.
    fn next_reference(&self, kind: TransactionKind) -> Result<String, StoreError>;

    /// Apply a unit of work atomically, or nothing at all.
    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError>;
}

impl<S> PostingStore for Arc<S>
where
    S: PostingStore + ?Sized,
{
    fn transaction(&self, id: TransactionId) -> Result<Option<Versioned<Transaction>>, StoreError> {
        (**self).transaction(id)
    }

    fn returns_for(&self, original_id: TransactionId) -> Result<Vec<Transaction>, StoreError> {
        (**self).returns_for(original_id)
    }

    fn stock_level(
        &self,
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<StockLevel, StoreError> {
        (**self).stock_level(item_id, warehouse_id)
    }

    fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>, StoreError> {
        (**self).movements_for_item(item_id)
    }

    fn entries_for_account(&self, account_code: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_for_account(account_code)
    }

    fn next_reference(&self, kind: TransactionKind) -> Result<String, StoreError> {
        (**self).next_reference(kind)
    }

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError> {
        (**self).commit(work)
    }
}
