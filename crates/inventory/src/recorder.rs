//! Stock movement decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postledger_core::{
    DomainError, DomainResult, ItemId, MovementId, Reference, WarehouseId,
};
use postledger_transactions::TransactionKind;

use crate::movement::{MovementType, StockMovement};

/// Which way an adjustment moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// What to do when a decrease would take the balance below zero.
///
/// `ClampToZero` matches the historical behavior: the balance floors at zero
/// and the movement records the smaller delta actually applied. `Reject`
/// surfaces `InsufficientStock` instead, so an upstream over-allocation bug
/// cannot hide behind the clamp. Transfers always behave like `Reject`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
    #[default]
    ClampToZero,
    Reject,
}

/// Cached running balance for an item (+ optional warehouse).
///
/// `version` is the optimistic-concurrency revision: the store bumps it on
/// every committed write and refuses writes staged against a stale version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub item_id: ItemId,
    pub warehouse_id: Option<WarehouseId>,
    pub on_hand: i64,
    pub version: u64,
}

impl StockLevel {
    /// A level that has never been written (balance zero, version zero).
    pub fn empty(item_id: ItemId, warehouse_id: Option<WarehouseId>) -> Self {
        Self {
            item_id,
            warehouse_id,
            on_hand: 0,
            version: 0,
        }
    }
}

/// Outcome of a single-sided stock decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub level: StockLevel,
    pub movement: StockMovement,
}

/// Outcome of a two-sided transfer decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockTransfer {
    pub from: StockAdjustment,
    pub to: StockAdjustment,
}

/// Apply a quantity change to a loaded stock level.
///
/// The returned movement carries the delta actually applied: under
/// [`ClampPolicy::ClampToZero`] a decrease below zero floors the balance and
/// shrinks the recorded delta accordingly.
#[allow(clippy::too_many_arguments)]
pub fn adjust(
    level: &StockLevel,
    quantity: i64,
    direction: Direction,
    movement_type: MovementType,
    policy: ClampPolicy,
    reference: Reference,
    note: Option<String>,
    occurred_at: DateTime<Utc>,
) -> DomainResult<StockAdjustment> {
    if quantity <= 0 {
        return Err(DomainError::invalid_quantity(
            "adjustment quantity must be positive",
        ));
    }

    let requested = match direction {
        Direction::Increase => quantity,
        Direction::Decrease => -quantity,
    };

    let unclamped = level.on_hand + requested;
    let (new_on_hand, applied) = if unclamped < 0 {
        match policy {
            ClampPolicy::ClampToZero => (0, -level.on_hand),
            ClampPolicy::Reject => {
                return Err(DomainError::InsufficientStock {
                    item_id: level.item_id.to_string(),
                    available: level.on_hand,
                    requested: quantity,
                });
            }
        }
    } else {
        (unclamped, requested)
    };

    let mut updated = level.clone();
    updated.on_hand = new_on_hand;

    Ok(StockAdjustment {
        level: updated,
        movement: StockMovement {
            id: MovementId::new(),
            item_id: level.item_id,
            warehouse_id: level.warehouse_id,
            delta: applied,
            movement_type,
            occurred_at,
            reference,
            note,
        },
    })
}

/// Movement type and direction for a return line of the given kind.
///
/// A return of a sale brings goods back from the customer (increase); a
/// return of a purchase sends goods back to the supplier (decrease).
pub fn return_movement(kind: TransactionKind) -> DomainResult<(MovementType, Direction)> {
    match kind {
        TransactionKind::ReturnOfSale => Ok((MovementType::ReturnFromCustomer, Direction::Increase)),
        TransactionKind::ReturnOfPurchase => {
            Ok((MovementType::ReturnToSupplier, Direction::Decrease))
        }
        _ => Err(DomainError::validation("kind", "not a return kind")),
    }
}

/// Reverse stock for one return line.
pub fn reverse_for_return(
    level: &StockLevel,
    kind: TransactionKind,
    abs_quantity: i64,
    policy: ClampPolicy,
    reference: Reference,
    occurred_at: DateTime<Utc>,
) -> DomainResult<StockAdjustment> {
    let (movement_type, direction) = return_movement(kind)?;
    adjust(
        level,
        abs_quantity,
        direction,
        movement_type,
        policy,
        reference,
        None,
        occurred_at,
    )
}

/// Move quantity between two locations of the same item.
///
/// Strictly checked: the source must hold at least `quantity`; a transfer
/// never clamps, because clamping would silently lose quantity in flight.
pub fn transfer(
    from: &StockLevel,
    to: &StockLevel,
    quantity: i64,
    reference: Reference,
    occurred_at: DateTime<Utc>,
) -> DomainResult<StockTransfer> {
    if quantity <= 0 {
        return Err(DomainError::invalid_quantity(
            "transfer quantity must be positive",
        ));
    }
    if from.item_id != to.item_id {
        return Err(DomainError::invariant(
            "transfer endpoints must hold the same item",
        ));
    }
    if from.warehouse_id == to.warehouse_id {
        return Err(DomainError::validation(
            "warehouse_id",
            "transfer source and destination are the same location",
        ));
    }
    if from.on_hand < quantity {
        return Err(DomainError::InsufficientStock {
            item_id: from.item_id.to_string(),
            available: from.on_hand,
            requested: quantity,
        });
    }

    let out = adjust(
        from,
        quantity,
        Direction::Decrease,
        MovementType::TransferOut,
        ClampPolicy::Reject,
        reference.clone(),
        None,
        occurred_at,
    )?;
    let inbound = adjust(
        to,
        quantity,
        Direction::Increase,
        MovementType::TransferIn,
        ClampPolicy::Reject,
        reference,
        None,
        occurred_at,
    )?;

    Ok(StockTransfer {
        from: out,
        to: inbound,
    })
}
