//! `postledger-transactions` — the invoice/return document model.
//!
//! A [`Transaction`] is a sale, purchase, or a return of either. Returns
//! reference the transaction they reverse and store their line quantities as
//! negative magnitudes; monetary totals are always computed over absolute
//! quantities.

pub mod transaction;

pub use transaction::{
    Transaction, TransactionKind, TransactionLine, TransactionStatus,
};
