//! The posting pipeline.
//!
//! One entry point per operation: create an invoice, create a return,
//! adjust stock, transfer stock. Each one validates, lets the domain crates
//! decide, stages everything into a [`UnitOfWork`] and commits it atomically.
//! Version conflicts restart the whole attempt from fresh reads, up to
//! [`PostingOrchestrator::max_attempts`] times; re-validation inside the loop
//! is what stops two concurrent returns from double-spending the same
//! returnable quantity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use postledger_accounting::{
    post_for_purchase, post_for_purchase_return, post_for_sale, post_for_sale_return,
    ChartOfAccounts, LedgerBatch,
};
use postledger_core::{
    quantity, CounterpartyId, DomainError, ItemId, Money, MovementId, Reference, TransactionId,
    WarehouseId,
};
use postledger_inventory::{
    adjust, reverse_for_return, transfer, ClampPolicy, Direction, MovementType, StockLevel,
    StockMovement,
};
use postledger_returns::{RequestedReturn, ReturnHistory, ReturnableLine, ValidationReport};
use postledger_tax::{Discount, TaxCode, TaxRateLookup, TaxTreatment};
use postledger_transactions::{Transaction, TransactionKind, TransactionLine};

use crate::cache::{InvalidationKey, InvalidationSink};
use crate::lookup::ItemCatalog;
use crate::store::{PostingStore, StoreError};
use crate::unit_of_work::UnitOfWork;

/// Error surface of the posting pipeline.
#[derive(Debug, Error)]
pub enum PostingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Every problem with a return request, reported together so the caller
    /// can fix them in one round trip.
    #[error("return request rejected with {} problem(s)", .0.len())]
    ReturnRejected(Vec<DomainError>),

    /// Non-retryable storage failure.
    #[error(transparent)]
    Store(StoreError),
}

/// One requested invoice line.
///
/// `quantity` is a positive magnitude; empty `tax_codes` fall back to the
/// item's catalog defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Discount,
    pub tax_codes: Vec<TaxCode>,
    pub warehouse_id: Option<WarehouseId>,
}

/// A sale or purchase to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub kind: TransactionKind,
    pub counterparty_id: CounterpartyId,
    pub date: DateTime<Utc>,
    pub tax_treatment: TaxTreatment,
    pub lines: Vec<LineRequest>,
}

/// A return to post against a previously posted sale or purchase.
///
/// Prices, discounts, tax codes and locations come from the original lines;
/// the request only says which items and how many. Flat-amount discounts
/// prorate by the returned share of the original quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub original_transaction_id: TransactionId,
    pub date: DateTime<Utc>,
    pub items: Vec<RequestedReturn>,
}

/// What a successful posting wrote.
///
/// `ledger` is `None` when the document had no monetary effect (every
/// rounded component was zero); the transaction and its stock movements
/// still commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub transaction: Transaction,
    pub movements: Vec<StockMovement>,
    pub ledger: Option<LedgerBatch>,
}

/// Pipeline stage, carried on tracing events so a failure log shows how far
/// the posting got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostingStage {
    Validating,
    Computing,
    AdjustingStock,
    PostingLedger,
    Persisting,
    Committed,
}

/// Build a ledger batch, logging an imbalance before propagating it: an
/// unbalanced batch is an internal bug, not caller input.
fn built(
    batch: postledger_core::DomainResult<Option<LedgerBatch>>,
) -> Result<Option<LedgerBatch>, PostingError> {
    batch.map_err(|err| {
        if matches!(err, DomainError::LedgerImbalance { .. }) {
            tracing::error!(error = %err, "posting produced an unbalanced ledger batch");
        }
        err.into()
    })
}

/// Drives the posting pipeline end to end.
#[derive(Debug)]
pub struct PostingOrchestrator<S, C, R, K> {
    store: S,
    catalog: C,
    rates: R,
    cache: K,
    accounts: ChartOfAccounts,
    clamp_policy: ClampPolicy,
    max_attempts: u32,
}

impl<S, C, R, K> PostingOrchestrator<S, C, R, K>
where
    S: PostingStore,
    C: ItemCatalog,
    R: TaxRateLookup,
    K: InvalidationSink,
{
    pub fn new(store: S, catalog: C, rates: R, cache: K) -> Self {
        Self {
            store,
            catalog,
            rates,
            cache,
            accounts: ChartOfAccounts::default(),
            clamp_policy: ClampPolicy::default(),
            max_attempts: 3,
        }
    }

    pub fn with_accounts(mut self, accounts: ChartOfAccounts) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_clamp_policy(mut self, policy: ClampPolicy) -> Self {
        self.clamp_policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Post a sale or purchase invoice: confirm the document, move stock for
    /// every line, write the balanced ledger batch, all in one commit.
    pub fn create_invoice(&self, request: InvoiceRequest) -> Result<Posted, PostingError> {
        let (movement_type, direction) = match request.kind {
            TransactionKind::Sale => (MovementType::Sale, Direction::Decrease),
            TransactionKind::Purchase => (MovementType::Purchase, Direction::Increase),
            _ => {
                return Err(DomainError::validation(
                    "kind",
                    "returns are posted via create_return",
                )
                .into());
            }
        };
        if request.lines.is_empty() {
            return Err(DomainError::validation("lines", "an invoice needs at least one line").into());
        }

        tracing::debug!(stage = ?PostingStage::Validating, kind = ?request.kind, "posting invoice");
        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let item = self
                .catalog
                .item(line.item_id)
                .ok_or_else(|| DomainError::not_found("item", line.item_id))?;
            if !item.active {
                return Err(DomainError::validation(
                    "item_id",
                    format!("item {} is inactive", line.item_id),
                )
                .into());
            }
            let tax_codes = if line.tax_codes.is_empty() {
                item.default_tax_codes
            } else {
                line.tax_codes.clone()
            };
            lines.push(TransactionLine {
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount,
                tax_codes,
                warehouse_id: line.warehouse_id,
            });
        }

        let reference = self
            .store
            .next_reference(request.kind)
            .map_err(PostingError::Store)?;

        for attempt in 1..=self.max_attempts {
            tracing::debug!(stage = ?PostingStage::Computing, %reference, attempt, "computing totals");
            let mut txn = Transaction::draft(
                TransactionId::new(),
                request.kind,
                request.counterparty_id,
                reference.clone(),
                request.date,
                None,
                request.tax_treatment,
                lines.clone(),
            )?;
            txn.compute_totals(&self.rates)?;
            txn.confirm()?;

            tracing::debug!(stage = ?PostingStage::AdjustingStock, %reference, "staging stock deltas");
            let document_ref = Reference::transaction(txn.id());
            let mut work = UnitOfWork::new();
            let mut movements = Vec::with_capacity(txn.lines().len());
            let mut levels: HashMap<(ItemId, Option<WarehouseId>), StockLevel> = HashMap::new();
            for line in txn.lines() {
                let key = (line.item_id, line.warehouse_id);
                let level = match levels.get(&key) {
                    Some(current) => current.clone(),
                    None => self
                        .store
                        .stock_level(line.item_id, line.warehouse_id)
                        .map_err(PostingError::Store)?,
                };
                let adjustment = adjust(
                    &level,
                    line.abs_quantity(),
                    direction,
                    movement_type,
                    self.clamp_policy,
                    document_ref.clone(),
                    None,
                    request.date,
                )?;
                levels.insert(key, adjustment.level.clone());
                movements.push(adjustment.movement.clone());
                work.stage_stock(adjustment);
            }

            tracing::debug!(stage = ?PostingStage::PostingLedger, %reference, "building ledger batch");
            let batch = built(match request.kind {
                TransactionKind::Purchase => post_for_purchase(&txn, &self.accounts),
                _ => post_for_sale(&txn, &self.accounts),
            })?;

            let keys = self.document_keys(txn.id(), None, batch.as_ref());
            work.invalidations = keys.clone();
            work.stage_transaction(txn.clone());
            if let Some(batch) = &batch {
                work.stage_ledger(batch.clone());
            }

            tracing::debug!(stage = ?PostingStage::Persisting, %reference, "committing unit of work");
            if self.try_commit(work)? {
                self.flush(&keys);
                tracing::info!(
                    stage = ?PostingStage::Committed,
                    reference = %txn.reference(),
                    kind = ?txn.kind(),
                    total = %txn.totals().grand_total.rounded(),
                    "invoice posted"
                );
                return Ok(Posted {
                    transaction: txn,
                    movements,
                    ledger: batch,
                });
            }
            tracing::warn!(attempt, reference = %reference, "invoice commit conflicted, retrying");
        }

        Err(DomainError::ConcurrencyConflict {
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Post a return against a posted sale or purchase.
    ///
    /// The original document and its prior returns are re-read and
    /// re-validated on every attempt, and the commit bumps the original's
    /// revision, so a racing sibling return conflicts instead of slipping
    /// past the returnable-quantity check.
    pub fn create_return(&self, request: ReturnRequest) -> Result<Posted, PostingError> {
        let original_kind = self
            .store
            .transaction(request.original_transaction_id)
            .map_err(PostingError::Store)?
            .ok_or_else(|| DomainError::not_found("transaction", request.original_transaction_id))?
            .record
            .kind();
        let return_kind = original_kind.return_kind().ok_or_else(|| {
            DomainError::validation(
                "original_transaction_id",
                "returns can only reverse a sale or a purchase",
            )
        })?;
        let reference = self
            .store
            .next_reference(return_kind)
            .map_err(PostingError::Store)?;

        for attempt in 1..=self.max_attempts {
            tracing::debug!(stage = ?PostingStage::Validating, %reference, attempt, "validating return");
            let original = self
                .store
                .transaction(request.original_transaction_id)
                .map_err(PostingError::Store)?
                .ok_or_else(|| {
                    DomainError::not_found("transaction", request.original_transaction_id)
                })?;
            original.record.ensure_reversible_by(return_kind)?;

            let prior = self
                .store
                .returns_for(request.original_transaction_id)
                .map_err(PostingError::Store)?;
            let history = ReturnHistory::new(&original.record, prior.iter())?;
            let report = history.validate(&request.items);
            if !report.is_valid() {
                return Err(PostingError::ReturnRejected(report.errors));
            }

            let mut lines = Vec::with_capacity(report.validated.len());
            for item in &report.validated {
                let original_line = original.record.line_for(item.item_id).ok_or_else(|| {
                    DomainError::ItemNotInOriginalTransaction {
                        item_id: item.item_id.to_string(),
                    }
                })?;
                lines.push(TransactionLine {
                    item_id: item.item_id,
                    quantity: -item.quantity,
                    unit_price: original_line.unit_price,
                    discount: prorated_discount(original_line, item.quantity),
                    tax_codes: original_line.tax_codes.clone(),
                    warehouse_id: original_line.warehouse_id,
                });
            }

            tracing::debug!(stage = ?PostingStage::Computing, %reference, "computing return totals");
            let mut txn = Transaction::draft(
                TransactionId::new(),
                return_kind,
                original.record.counterparty_id(),
                reference.clone(),
                request.date,
                Some(original.record.id()),
                original.record.tax_treatment(),
                lines,
            )?;
            txn.compute_totals(&self.rates)?;
            txn.confirm()?;

            tracing::debug!(stage = ?PostingStage::AdjustingStock, %reference, "staging stock reversals");
            let document_ref = Reference::transaction(txn.id());
            let mut work = UnitOfWork::new();
            let mut movements = Vec::with_capacity(txn.lines().len());
            let mut levels: HashMap<(ItemId, Option<WarehouseId>), StockLevel> = HashMap::new();
            for line in txn.lines() {
                let key = (line.item_id, line.warehouse_id);
                let level = match levels.get(&key) {
                    Some(current) => current.clone(),
                    None => self
                        .store
                        .stock_level(line.item_id, line.warehouse_id)
                        .map_err(PostingError::Store)?,
                };
                let adjustment = reverse_for_return(
                    &level,
                    return_kind,
                    line.abs_quantity(),
                    self.clamp_policy,
                    document_ref.clone(),
                    request.date,
                )?;
                levels.insert(key, adjustment.level.clone());
                movements.push(adjustment.movement.clone());
                work.stage_stock(adjustment);
            }

            tracing::debug!(stage = ?PostingStage::PostingLedger, %reference, "building reversal batch");
            let batch = built(match return_kind {
                TransactionKind::ReturnOfPurchase => {
                    post_for_purchase_return(&txn, &original.record, &self.accounts)
                }
                _ => post_for_sale_return(&txn, &original.record, &self.accounts),
            })?;

            let keys = self.document_keys(txn.id(), Some(original.record.id()), batch.as_ref());
            work.invalidations = keys.clone();
            work.stage_transaction(txn.clone());
            work.touch_original(original.record.id(), original.version);
            if let Some(batch) = &batch {
                work.stage_ledger(batch.clone());
            }

            tracing::debug!(stage = ?PostingStage::Persisting, %reference, "committing unit of work");
            if self.try_commit(work)? {
                self.flush(&keys);
                tracing::info!(
                    stage = ?PostingStage::Committed,
                    reference = %txn.reference(),
                    original = %original.record.reference(),
                    kind = ?txn.kind(),
                    total = %txn.totals().grand_total.rounded(),
                    "return posted"
                );
                return Ok(Posted {
                    transaction: txn,
                    movements,
                    ledger: batch,
                });
            }
            tracing::warn!(attempt, reference = %reference, "return commit conflicted, retrying");
        }

        Err(DomainError::ConcurrencyConflict {
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Validate a return request without posting anything.
    pub fn validate_return(
        &self,
        original_id: TransactionId,
        items: &[RequestedReturn],
    ) -> Result<ValidationReport, PostingError> {
        let original = self
            .store
            .transaction(original_id)
            .map_err(PostingError::Store)?
            .ok_or_else(|| DomainError::not_found("transaction", original_id))?;
        let prior = self
            .store
            .returns_for(original_id)
            .map_err(PostingError::Store)?;
        let history = ReturnHistory::new(&original.record, prior.iter())?;
        Ok(history.validate(items))
    }

    /// Lines of the original document that still have returnable quantity.
    pub fn list_returnable(
        &self,
        original_id: TransactionId,
    ) -> Result<Vec<ReturnableLine>, PostingError> {
        let original = self
            .store
            .transaction(original_id)
            .map_err(PostingError::Store)?
            .ok_or_else(|| DomainError::not_found("transaction", original_id))?;
        let prior = self
            .store
            .returns_for(original_id)
            .map_err(PostingError::Store)?;
        let history = ReturnHistory::new(&original.record, prior.iter())?;
        Ok(history.list_returnable())
    }

    /// Render an item's on-hand balance as cartons/boxes/units using the
    /// catalog's packaging configuration (e.g. `"10 Cartons 3 Boxes 4 Units"`).
    pub fn packed_stock(
        &self,
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<String, PostingError> {
        let item = self
            .catalog
            .item(item_id)
            .ok_or_else(|| DomainError::not_found("item", item_id))?;
        let level = self
            .store
            .stock_level(item_id, warehouse_id)
            .map_err(PostingError::Store)?;
        let (boxes, units) = quantity::breakdown(level.on_hand.max(0), item.pack_size)?;
        let (cartons, boxes) = quantity::breakdown(boxes, item.boxes_per_carton)?;
        Ok(quantity::format_packed(cartons, boxes, units))
    }

    /// Manual stock adjustment (cycle count, damage, shrinkage).
    pub fn adjust_stock(
        &self,
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
        quantity: i64,
        direction: Direction,
        note: Option<String>,
    ) -> Result<StockMovement, PostingError> {
        self.catalog
            .item(item_id)
            .ok_or_else(|| DomainError::not_found("item", item_id))?;

        for attempt in 1..=self.max_attempts {
            let level = self
                .store
                .stock_level(item_id, warehouse_id)
                .map_err(PostingError::Store)?;
            let adjustment = adjust(
                &level,
                quantity,
                direction,
                MovementType::Adjustment,
                self.clamp_policy,
                Reference::stock_adjustment(MovementId::new()),
                note.clone(),
                Utc::now(),
            )?;
            let movement = adjustment.movement.clone();

            let mut work = UnitOfWork::new();
            work.stage_stock(adjustment);
            if self.try_commit(work)? {
                tracing::info!(
                    item = %item_id,
                    delta = movement.delta,
                    "stock adjusted"
                );
                return Ok(movement);
            }
            tracing::warn!(attempt, item = %item_id, "stock adjustment conflicted, retrying");
        }

        Err(DomainError::ConcurrencyConflict {
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Move quantity between two locations of the same item. Always strict:
    /// a short source fails, it never clamps.
    pub fn transfer_stock(
        &self,
        item_id: ItemId,
        from: Option<WarehouseId>,
        to: Option<WarehouseId>,
        quantity: i64,
    ) -> Result<(StockMovement, StockMovement), PostingError> {
        self.catalog
            .item(item_id)
            .ok_or_else(|| DomainError::not_found("item", item_id))?;

        for attempt in 1..=self.max_attempts {
            let from_level = self
                .store
                .stock_level(item_id, from)
                .map_err(PostingError::Store)?;
            let to_level = self
                .store
                .stock_level(item_id, to)
                .map_err(PostingError::Store)?;
            let moved = transfer(
                &from_level,
                &to_level,
                quantity,
                Reference::stock_transfer(MovementId::new()),
                Utc::now(),
            )?;
            let out = moved.from.movement.clone();
            let inbound = moved.to.movement.clone();

            let mut work = UnitOfWork::new();
            work.stage_stock(moved.from);
            work.stage_stock(moved.to);
            if self.try_commit(work)? {
                tracing::info!(item = %item_id, quantity, "stock transferred");
                return Ok((out, inbound));
            }
            tracing::warn!(attempt, item = %item_id, "stock transfer conflicted, retrying");
        }

        Err(DomainError::ConcurrencyConflict {
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Commit one attempt; `Ok(false)` is a retryable version conflict.
    fn try_commit(&self, work: UnitOfWork) -> Result<bool, PostingError> {
        match self.store.commit(work) {
            Ok(()) => Ok(true),
            Err(StoreError::Conflict { entity, id, .. }) => {
                tracing::debug!(entity, %id, "optimistic commit conflict");
                Ok(false)
            }
            Err(other) => Err(PostingError::Store(other)),
        }
    }

    fn document_keys(
        &self,
        id: TransactionId,
        original: Option<TransactionId>,
        batch: Option<&LedgerBatch>,
    ) -> Vec<InvalidationKey> {
        let mut keys = vec![InvalidationKey::Transaction(id)];
        if let Some(original) = original {
            keys.push(InvalidationKey::Transaction(original));
        }
        keys.push(InvalidationKey::TransactionList);
        if let Some(batch) = batch {
            for code in batch.account_codes() {
                keys.push(InvalidationKey::LedgerAccount(code.to_string()));
            }
        }
        keys
    }

    fn flush(&self, keys: &[InvalidationKey]) {
        for key in keys {
            self.cache.invalidate(key);
        }
    }
}

/// Carry a line discount over to a partial return.
///
/// Percentages apply unchanged; a flat amount covers the whole original line,
/// so the returned share gets the proportional slice.
fn prorated_discount(original_line: &TransactionLine, returned_quantity: i64) -> Discount {
    match original_line.discount {
        Discount::Amount(amount) => {
            let original_quantity = original_line.abs_quantity();
            if returned_quantity >= original_quantity {
                Discount::Amount(amount)
            } else {
                Discount::Amount(
                    amount
                        .scale_by(Decimal::from(returned_quantity))
                        .divide_by(Decimal::from(original_quantity)),
                )
            }
        }
        other => other,
    }
}
