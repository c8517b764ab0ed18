//! In-memory posting store.
//!
//! Intended for tests/dev. Not optimized for performance. A single `RwLock`
//! over the whole state makes every commit single-writer, which is what
//! gives the unit of work its all-or-nothing guarantee here.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use postledger_accounting::LedgerEntry;
use postledger_core::{ItemId, TransactionId, WarehouseId};
use postledger_inventory::{StockLevel, StockMovement};
use postledger_transactions::{Transaction, TransactionKind};

use crate::store::{PostingStore, StoreError, Versioned};
use crate::unit_of_work::UnitOfWork;

type StockKey = (ItemId, Option<WarehouseId>);

#[derive(Debug, Default)]
struct State {
    transactions: HashMap<TransactionId, Versioned<Transaction>>,
    stock: HashMap<StockKey, StockLevel>,
    movements: Vec<StockMovement>,
    ledger: Vec<LedgerEntry>,
    sequences: HashMap<&'static str, u64>,
}

impl State {
    fn stock_version(&self, key: &StockKey) -> u64 {
        self.stock.get(key).map(|level| level.version).unwrap_or(0)
    }
}

/// In-memory [`PostingStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PostingStore for InMemoryStore {
    fn transaction(&self, id: TransactionId) -> Result<Option<Versioned<Transaction>>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.transactions.get(&id).cloned())
    }

    fn returns_for(&self, original_id: TransactionId) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .transactions
            .values()
            .filter(|v| v.record.original_transaction_id() == Some(original_id))
            .map(|v| v.record.clone())
            .collect())
    }

    fn stock_level(
        &self,
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<StockLevel, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .stock
            .get(&(item_id, warehouse_id))
            .cloned()
            .unwrap_or_else(|| StockLevel::empty(item_id, warehouse_id)))
    }

    fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.item_id == item_id)
            .cloned()
            .collect())
    }

    fn entries_for_account(&self, account_code: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.account.code == account_code)
            .cloned()
            .collect())
    }

    fn next_reference(&self, kind: TransactionKind) -> Result<String, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let prefix = kind.reference_prefix();
        let next = state.sequences.entry(prefix).or_insert(0);
        *next += 1;
        Ok(format!("{prefix}-{:06}", *next))
    }

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;

        // Validate every staged write before applying any of them. Chained
        // adjustments to the same level in one unit of work all carry the
        // first read's version, so only that first occurrence is checked
        // against the store.
        if let Some(txn) = &work.transaction {
            if state.transactions.contains_key(&txn.id()) {
                return Err(StoreError::Duplicate {
                    entity: "transaction",
                    id: txn.id().to_string(),
                });
            }
        }
        if let Some((id, read_version)) = work.touch {
            let current = state.transactions.get(&id).ok_or(StoreError::Missing {
                entity: "transaction",
                id: id.to_string(),
            })?;
            if current.version != read_version {
                return Err(StoreError::Conflict {
                    entity: "transaction",
                    id: id.to_string(),
                    staged: read_version,
                    current: current.version,
                });
            }
        }
        let mut checked: HashSet<StockKey> = HashSet::new();
        for adjustment in &work.stock {
            let key = (adjustment.level.item_id, adjustment.level.warehouse_id);
            if !checked.insert(key) {
                continue;
            }
            let current = state.stock_version(&key);
            if adjustment.level.version != current {
                return Err(StoreError::Conflict {
                    entity: "stock_level",
                    id: adjustment.level.item_id.to_string(),
                    staged: adjustment.level.version,
                    current,
                });
            }
        }

        // Apply.
        if let Some(txn) = work.transaction {
            state.transactions.insert(
                txn.id(),
                Versioned {
                    record: txn,
                    version: 1,
                },
            );
        }
        if let Some((id, _)) = work.touch {
            if let Some(original) = state.transactions.get_mut(&id) {
                original.version += 1;
            }
        }
        for adjustment in work.stock {
            let key = (adjustment.level.item_id, adjustment.level.warehouse_id);
            let mut level = adjustment.level;
            level.version = state.stock_version(&key) + 1;
            state.stock.insert(key, level);
            state.movements.push(adjustment.movement);
        }
        if let Some(batch) = work.ledger {
            state.ledger.extend(batch.into_entries());
        }

        Ok(())
    }
}
