//! `postledger-inventory` — on-hand stock and immutable movements.
//!
//! Every quantity change to on-hand inventory is decided here as a pure
//! function over a loaded [`StockLevel`], producing the updated level plus an
//! append-only [`StockMovement`] carrying the delta actually applied.
//! Persistence is the unit of work's job.

pub mod movement;
pub mod recorder;

pub use movement::{MovementType, StockMovement};
pub use recorder::{
    adjust, return_movement, reverse_for_return, transfer, ClampPolicy, Direction,
    StockAdjustment, StockLevel, StockTransfer,
};
