//! `postledger-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, money arithmetic, packaging-unit conversion, document
//! references and the closed error taxonomy shared by every other crate.

pub mod error;
pub mod id;
pub mod money;
pub mod quantity;
pub mod reference;

pub use error::{DomainError, DomainResult};
pub use id::{
    CounterpartyId, EntryId, ItemId, MovementId, TransactionId, WarehouseId,
};
pub use money::Money;
pub use reference::{Reference, ReferenceKind};
