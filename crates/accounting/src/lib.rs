//! `postledger-accounting` — double-entry ledger posting.
//!
//! Every financial event is recorded as a batch of immutable entries whose
//! debits and credits sum equal. The balance check runs before anything
//! reaches storage; an unbalanced batch is a bug, not a caller error.

pub mod entry;
pub mod posting;

pub use entry::{Account, AccountKind, LedgerBatch, LedgerEntry};
pub use posting::{
    post_for_purchase, post_for_purchase_return, post_for_sale, post_for_sale_return,
    ChartOfAccounts,
};
