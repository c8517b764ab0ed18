//! The atomically committed write set.
//!
//! A posting operation stages everything it intends to write, then hands the
//! whole set to [`crate::store::PostingStore::commit`]. Either every staged
//! write lands or none does; there is no partial posting to clean up after.

use postledger_accounting::LedgerBatch;
use postledger_core::TransactionId;
use postledger_inventory::StockAdjustment;
use postledger_transactions::Transaction;

use crate::cache::InvalidationKey;

/// Writes staged by one posting operation.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    /// A new document to insert (revision 1). Never an update.
    pub transaction: Option<Transaction>,
    /// Bump this document's revision, checked against the version it was
    /// read at. A committing return touches its original so that a sibling
    /// return staged against the same snapshot conflicts instead of
    /// double-spending the returnable quantity.
    pub touch: Option<(TransactionId, u64)>,
    /// Updated stock levels plus their movements. Each adjustment carries
    /// the version its level was read at.
    pub stock: Vec<StockAdjustment>,
    /// Balanced ledger entries, if the operation posts to the ledger.
    pub ledger: Option<LedgerBatch>,
    /// Cache keys to invalidate after the commit succeeds. The store ignores
    /// these; the orchestrator emits them post-commit.
    pub invalidations: Vec<InvalidationKey>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_transaction(&mut self, transaction: Transaction) {
        self.transaction = Some(transaction);
    }

    pub fn touch_original(&mut self, id: TransactionId, read_version: u64) {
        self.touch = Some((id, read_version));
    }

    pub fn stage_stock(&mut self, adjustment: StockAdjustment) {
        self.stock.push(adjustment);
    }

    pub fn stage_ledger(&mut self, batch: LedgerBatch) {
        self.ledger = Some(batch);
    }

    pub fn invalidate(&mut self, key: InvalidationKey) {
        self.invalidations.push(key);
    }

    pub fn is_empty(&self) -> bool {
        self.transaction.is_none()
            && self.touch.is_none()
            && self.stock.is_empty()
            && self.ledger.is_none()
    }
}
