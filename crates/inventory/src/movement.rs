use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postledger_core::{ItemId, MovementId, Reference, WarehouseId};

/// Why a stock movement happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Sale,
    Purchase,
    ReturnFromCustomer,
    ReturnToSupplier,
    TransferOut,
    TransferIn,
    Adjustment,
}

/// Immutable record of one quantity change.
///
/// Movements are append-only: never updated, never deleted. The on-hand
/// balance for an item (+ warehouse) is the running sum of `delta`s; the
/// cached balance lives on [`super::StockLevel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub item_id: ItemId,
    pub warehouse_id: Option<WarehouseId>,
    /// The delta actually applied (post-clamp), not the requested one.
    pub delta: i64,
    pub movement_type: MovementType,
    pub occurred_at: DateTime<Utc>,
    pub reference: Reference,
    /// Free-form operator reason, carried on manual adjustments.
    pub note: Option<String>,
}
