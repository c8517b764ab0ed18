//! `postledger-returns` — returnable-quantity validation.
//!
//! Answers "how much of the original transaction can still be returned",
//! using the original document and every non-cancelled return that references
//! it. The validator itself is pure; the posting orchestrator re-reads the
//! history and re-validates inside its retry loop, because an `available`
//! figure cached across the validate/apply boundary can be double-spent by a
//! concurrent return.

pub mod validator;

pub use validator::{
    RequestedReturn, ReturnHistory, ReturnableLine, ValidatedReturn, ValidationReport,
};
