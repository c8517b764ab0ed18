//! `postledger-tax` — tax computation for invoice and return lines.
//!
//! Computes per-line and per-invoice tax breakdowns for percentage-rate tax
//! codes (GST/WHT style), with either tax-exclusive or tax-inclusive pricing.
//! All intermediate amounts stay unrounded; presentation rounding is the
//! caller's concern (see `postledger_core::Money::rounded`).

pub mod code;
pub mod engine;

pub use code::{TaxCode, TaxRate, TaxRateLookup, TaxRateRecord};
pub use engine::{
    calculate_invoice_tax, calculate_line_tax, calculate_tax, Discount, InvoiceTotals, LineTax,
    TaxBreakdown, TaxLine, TaxTreatment,
};
