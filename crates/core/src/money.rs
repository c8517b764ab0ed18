//! Exact decimal money.
//!
//! Monetary amounts are `rust_decimal::Decimal` behind a newtype. Intermediate
//! arithmetic (tax bases, per-line accumulation) is kept unrounded; rounding to
//! two decimal places happens exactly once, at presentation, via [`Money::rounded`].
//! Rounding per intermediate step would drift when summing many lines.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount in the document currency.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole currency units (e.g. `Money::from_major(100)` is 100.00).
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// The presentation value: rounded once to 2 decimal places, midpoints
    /// away from zero.
    pub fn rounded(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiply by a bare decimal factor (rates, percentages).
    pub fn scale_by(&self, factor: Decimal) -> Self {
        Self(self.0 * factor)
    }

    /// Divide by a bare decimal factor. Callers guarantee `divisor != 0`.
    pub fn divide_by(&self, divisor: Decimal) -> Self {
        Self(self.0 / divisor)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.rounded().0)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Mul<i64> for Money {
    type Output = Money;
    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}
