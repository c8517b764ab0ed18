//! Tax codes and rates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use postledger_core::{DomainError, DomainResult};

/// A tax code as configured in master data (e.g. `"GST"`, `"WHT"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxCode(String);

impl TaxCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TaxCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaxCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A validated percentage rate expressed as a fraction (0.18 = 18%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// Standard constructor: rate must lie in `[0, 1]`.
    pub fn new(rate: Decimal) -> DomainResult<Self> {
        if rate.is_sign_negative() || rate > Decimal::ONE {
            return Err(DomainError::InvalidRate(rate));
        }
        Ok(Self(rate))
    }

    /// Rates above 100% are unusual but exist (e.g. excise); this path allows
    /// them while still rejecting negatives.
    pub fn uncapped(rate: Decimal) -> DomainResult<Self> {
        if rate.is_sign_negative() {
            return Err(DomainError::InvalidRate(rate));
        }
        Ok(Self(rate))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

/// Rate record as served by the master-data lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRateRecord {
    pub rate: TaxRate,
    /// Compounding codes apply to the taxable base plus previously
    /// accumulated tax (tax-on-tax); independent codes share the base.
    pub compounding: bool,
    pub active_from: DateTime<Utc>,
}

impl TaxRateRecord {
    pub fn active_at(&self, as_of: DateTime<Utc>) -> bool {
        self.active_from <= as_of
    }
}

/// Read-only tax-rate lookup (external master data).
pub trait TaxRateLookup {
    fn rate(&self, code: &TaxCode) -> Option<TaxRateRecord>;

    /// Resolve a code for a document dated `as_of`; codes not yet active are
    /// indistinguishable from unknown ones on purpose.
    fn resolve(&self, code: &TaxCode, as_of: DateTime<Utc>) -> DomainResult<TaxRateRecord> {
        self.rate(code)
            .filter(|r| r.active_at(as_of))
            .ok_or_else(|| DomainError::UnknownTaxCode(code.to_string()))
    }
}

impl<T: TaxRateLookup + ?Sized> TaxRateLookup for &T {
    fn rate(&self, code: &TaxCode) -> Option<TaxRateRecord> {
        (**self).rate(code)
    }
}
