//! Tax breakdown computation.
//!
//! A line may carry several simultaneous tax codes. Each independent code
//! applies to the same taxable base; a code flagged compounding applies to the
//! base plus tax accumulated by the codes before it. Either way the total tax
//! is linear in the taxable base, so each code reduces to a coefficient and
//! inclusive pricing is solved exactly by dividing the gross amount by
//! `1 + sum(coefficients)`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use postledger_core::{DomainError, DomainResult, Money};

use crate::code::{TaxCode, TaxRate, TaxRateLookup};

/// Whether line prices already contain tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxTreatment {
    Exclusive,
    Inclusive,
}

/// Per-line discount, a percentage of the subtotal or an absolute amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discount {
    None,
    /// Percentage of the line subtotal, expressed 0..=100.
    Percent(Decimal),
    Amount(Money),
}

impl Discount {
    fn amount_for(&self, subtotal: Money) -> DomainResult<Money> {
        match *self {
            Discount::None => Ok(Money::ZERO),
            Discount::Percent(pct) => {
                if pct.is_sign_negative() || pct > Decimal::from(100) {
                    return Err(DomainError::validation(
                        "discount",
                        format!("discount percent out of range: {pct}"),
                    ));
                }
                Ok(subtotal.scale_by(pct / Decimal::from(100)))
            }
            Discount::Amount(amount) => {
                if amount.is_negative() {
                    return Err(DomainError::validation(
                        "discount",
                        "discount amount cannot be negative",
                    ));
                }
                if amount > subtotal {
                    return Err(DomainError::validation(
                        "discount",
                        "discount amount exceeds line subtotal",
                    ));
                }
                Ok(amount)
            }
        }
    }
}

/// Input view of one document line for tax purposes.
///
/// Quantities here are magnitudes; the signed storage convention for return
/// lines is a document concern, not a tax one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Discount,
    pub tax_codes: Vec<TaxCode>,
}

/// Single-amount breakdown, all components unrounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub taxable: Money,
    pub tax: Money,
    pub gross: Money,
}

/// Per-line result of [`calculate_line_tax`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTax {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub taxable: Money,
    /// One entry per tax code, in the line's code order.
    pub taxes: Vec<(TaxCode, Money)>,
    pub total_tax: Money,
    pub gross: Money,
}

/// Invoice-level totals aggregated over all lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub total_discount: Money,
    pub taxable: Money,
    pub tax_by_code: BTreeMap<TaxCode, Money>,
    pub total_tax: Money,
    pub grand_total: Money,
}

/// Breakdown for a single amount and rate.
///
/// Exclusive: `tax = amount * rate`, `gross = amount + tax`.
/// Inclusive: `taxable = amount / (1 + rate)`, `tax = amount - taxable`.
pub fn calculate_tax(
    amount: Money,
    rate: TaxRate,
    treatment: TaxTreatment,
) -> DomainResult<TaxBreakdown> {
    if amount.is_negative() {
        return Err(DomainError::invalid_quantity("amount cannot be negative"));
    }
    let r = rate.as_decimal();
    Ok(match treatment {
        TaxTreatment::Exclusive => {
            let tax = amount.scale_by(r);
            TaxBreakdown {
                taxable: amount,
                tax,
                gross: amount + tax,
            }
        }
        TaxTreatment::Inclusive => {
            let taxable = amount.divide_by(Decimal::ONE + r);
            TaxBreakdown {
                taxable,
                tax: amount - taxable,
                gross: amount,
            }
        }
    })
}

/// Per-line breakdown across the line's tax codes.
pub fn calculate_line_tax(
    line: &TaxLine,
    lookup: &impl TaxRateLookup,
    treatment: TaxTreatment,
    as_of: DateTime<Utc>,
) -> DomainResult<LineTax> {
    if line.quantity < 0 {
        return Err(DomainError::invalid_quantity("quantity cannot be negative"));
    }
    if line.unit_price.is_negative() {
        return Err(DomainError::invalid_quantity("unit price cannot be negative"));
    }

    let subtotal = line.unit_price * line.quantity;
    let discount_amount = line.discount.amount_for(subtotal)?;
    let net = subtotal - discount_amount;

    // Reduce each code to a coefficient against the taxable base. Independent
    // codes contribute `rate`; a compounding code contributes
    // `rate * (1 + tax accumulated so far)`.
    let mut coefficients = Vec::with_capacity(line.tax_codes.len());
    let mut accumulated = Decimal::ZERO;
    for code in &line.tax_codes {
        let record = lookup.resolve(code, as_of)?;
        let base = if record.compounding {
            Decimal::ONE + accumulated
        } else {
            Decimal::ONE
        };
        let coefficient = record.rate.as_decimal() * base;
        accumulated += coefficient;
        coefficients.push((code.clone(), coefficient));
    }

    let taxable = match treatment {
        TaxTreatment::Exclusive => net,
        TaxTreatment::Inclusive => net.divide_by(Decimal::ONE + accumulated),
    };

    let taxes: Vec<(TaxCode, Money)> = coefficients
        .into_iter()
        .map(|(code, coefficient)| (code, taxable.scale_by(coefficient)))
        .collect();
    let total_tax: Money = taxes.iter().map(|(_, t)| *t).sum();

    let gross = match treatment {
        TaxTreatment::Exclusive => taxable + total_tax,
        // Inclusive prices already carry the tax; the gross is the net amount
        // itself, exactly, rather than re-multiplied division output.
        TaxTreatment::Inclusive => net,
    };

    Ok(LineTax {
        subtotal,
        discount_amount,
        taxable,
        taxes,
        total_tax,
        gross,
    })
}

/// Invoice totals: line sums plus per-code tax subtotals.
///
/// `grand_total = taxable + sum of tax amounts`.
pub fn calculate_invoice_tax(
    lines: &[TaxLine],
    lookup: &impl TaxRateLookup,
    treatment: TaxTreatment,
    as_of: DateTime<Utc>,
) -> DomainResult<InvoiceTotals> {
    let mut totals = InvoiceTotals::default();
    for line in lines {
        let line_tax = calculate_line_tax(line, lookup, treatment, as_of)?;
        totals.subtotal += line_tax.subtotal;
        totals.total_discount += line_tax.discount_amount;
        totals.taxable += line_tax.taxable;
        for (code, amount) in line_tax.taxes {
            *totals.tax_by_code.entry(code).or_insert(Money::ZERO) += amount;
        }
        totals.total_tax += line_tax.total_tax;
    }
    totals.grand_total = totals.taxable + totals.total_tax;
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::code::TaxRateRecord;

    struct Rates(BTreeMap<TaxCode, TaxRateRecord>);

    impl Rates {
        fn standard() -> Self {
            let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
            let mut map = BTreeMap::new();
            map.insert(
                TaxCode::from("GST"),
                TaxRateRecord {
                    rate: TaxRate::new(dec!(0.18)).unwrap(),
                    compounding: false,
                    active_from: epoch,
                },
            );
            map.insert(
                TaxCode::from("WHT"),
                TaxRateRecord {
                    rate: TaxRate::new(dec!(0.05)).unwrap(),
                    compounding: false,
                    active_from: epoch,
                },
            );
            map.insert(
                TaxCode::from("CESS"),
                TaxRateRecord {
                    rate: TaxRate::new(dec!(0.10)).unwrap(),
                    compounding: true,
                    active_from: epoch,
                },
            );
            map.insert(
                TaxCode::from("FUTURE"),
                TaxRateRecord {
                    rate: TaxRate::new(dec!(0.25)).unwrap(),
                    compounding: false,
                    active_from: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
                },
            );
            Self(map)
        }
    }

    impl TaxRateLookup for Rates {
        fn rate(&self, code: &TaxCode) -> Option<TaxRateRecord> {
            self.0.get(code).copied()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn gst_line(quantity: i64, unit_price: i64) -> TaxLine {
        TaxLine {
            quantity,
            unit_price: Money::from_major(unit_price),
            discount: Discount::None,
            tax_codes: vec![TaxCode::from("GST")],
        }
    }

    #[test]
    fn exclusive_gst_on_10000() {
        // Subtotal 10000, GST 18% exclusive: tax 1800, grand total 11800.
        let b = calculate_tax(
            Money::from_major(10_000),
            TaxRate::new(dec!(0.18)).unwrap(),
            TaxTreatment::Exclusive,
        )
        .unwrap();
        assert_eq!(b.taxable, Money::from_major(10_000));
        assert_eq!(b.tax.rounded(), Money::from_major(1_800));
        assert_eq!(b.gross.rounded(), Money::from_major(11_800));
    }

    #[test]
    fn inclusive_gst_on_11800() {
        // Inclusive price 11800 at 18%: taxable 10000, gross stays 11800.
        let b = calculate_tax(
            Money::from_major(11_800),
            TaxRate::new(dec!(0.18)).unwrap(),
            TaxTreatment::Inclusive,
        )
        .unwrap();
        assert_eq!(b.taxable.rounded(), Money::from_major(10_000));
        assert_eq!(b.tax.rounded(), Money::from_major(1_800));
        assert_eq!(b.gross, Money::from_major(11_800));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let err = calculate_tax(
            -Money::from_major(1),
            TaxRate::new(dec!(0.18)).unwrap(),
            TaxTreatment::Exclusive,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn independent_codes_share_the_taxable_base() {
        let line = TaxLine {
            quantity: 1,
            unit_price: Money::from_major(1_000),
            discount: Discount::None,
            tax_codes: vec![TaxCode::from("GST"), TaxCode::from("WHT")],
        };
        let lt = calculate_line_tax(&line, &Rates::standard(), TaxTreatment::Exclusive, now())
            .unwrap();
        assert_eq!(lt.taxable, Money::from_major(1_000));
        assert_eq!(lt.taxes[0].1.rounded(), Money::from_major(180));
        assert_eq!(lt.taxes[1].1.rounded(), Money::from_major(50));
        assert_eq!(lt.gross.rounded(), Money::from_major(1_230));
    }

    #[test]
    fn compounding_code_taxes_accumulated_tax() {
        // GST 18% then CESS 10% compounding: cess base is 1.18 per unit of
        // taxable, so cess on 1000 is 118.
        let line = TaxLine {
            quantity: 1,
            unit_price: Money::from_major(1_000),
            discount: Discount::None,
            tax_codes: vec![TaxCode::from("GST"), TaxCode::from("CESS")],
        };
        let lt = calculate_line_tax(&line, &Rates::standard(), TaxTreatment::Exclusive, now())
            .unwrap();
        assert_eq!(lt.taxes[0].1.rounded(), Money::from_major(180));
        assert_eq!(lt.taxes[1].1.rounded(), Money::from_major(118));
        assert_eq!(lt.gross.rounded(), Money::from_major(1_298));
    }

    #[test]
    fn percent_discount_shrinks_the_taxable_base() {
        let line = TaxLine {
            quantity: 10,
            unit_price: Money::from_major(100),
            discount: Discount::Percent(dec!(10)),
            tax_codes: vec![TaxCode::from("GST")],
        };
        let lt = calculate_line_tax(&line, &Rates::standard(), TaxTreatment::Exclusive, now())
            .unwrap();
        assert_eq!(lt.subtotal, Money::from_major(1_000));
        assert_eq!(lt.discount_amount, Money::from_major(100));
        assert_eq!(lt.taxable, Money::from_major(900));
        assert_eq!(lt.total_tax.rounded(), Money::from_major(162));
    }

    #[test]
    fn absolute_discount_cannot_exceed_subtotal() {
        let line = TaxLine {
            quantity: 1,
            unit_price: Money::from_major(50),
            discount: Discount::Amount(Money::from_major(60)),
            tax_codes: vec![],
        };
        let err = calculate_line_tax(&line, &Rates::standard(), TaxTreatment::Exclusive, now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "discount"));
    }

    #[test]
    fn unknown_and_not_yet_active_codes_are_rejected() {
        let mut line = gst_line(1, 100);
        line.tax_codes = vec![TaxCode::from("VAT")];
        let err = calculate_line_tax(&line, &Rates::standard(), TaxTreatment::Exclusive, now())
            .unwrap_err();
        assert_eq!(err, DomainError::UnknownTaxCode("VAT".to_string()));

        line.tax_codes = vec![TaxCode::from("FUTURE")];
        let err = calculate_line_tax(&line, &Rates::standard(), TaxTreatment::Exclusive, now())
            .unwrap_err();
        assert_eq!(err, DomainError::UnknownTaxCode("FUTURE".to_string()));
    }

    #[test]
    fn invoice_totals_sum_lines_and_codes() {
        let lines = vec![
            gst_line(10, 100),
            TaxLine {
                quantity: 2,
                unit_price: Money::from_major(500),
                discount: Discount::None,
                tax_codes: vec![TaxCode::from("GST"), TaxCode::from("WHT")],
            },
        ];
        let totals =
            calculate_invoice_tax(&lines, &Rates::standard(), TaxTreatment::Exclusive, now())
                .unwrap();
        assert_eq!(totals.subtotal, Money::from_major(2_000));
        assert_eq!(totals.taxable, Money::from_major(2_000));
        assert_eq!(
            totals.tax_by_code[&TaxCode::from("GST")].rounded(),
            Money::from_major(360)
        );
        assert_eq!(
            totals.tax_by_code[&TaxCode::from("WHT")].rounded(),
            Money::from_major(50)
        );
        assert_eq!(totals.grand_total.rounded(), Money::new(dec!(2410.00)));
    }

    proptest! {
        /// Inclusive then exclusive on the resulting taxable amount
        /// reproduces the original gross within half a cent.
        #[test]
        fn inclusive_exclusive_round_trip(
            cents in 1i64..100_000_000,
            rate_bps in 0u32..=10_000,
        ) {
            let amount = Money::new(Decimal::new(cents, 2));
            let rate = TaxRate::new(Decimal::new(rate_bps as i64, 4)).unwrap();
            let inclusive = calculate_tax(amount, rate, TaxTreatment::Inclusive).unwrap();
            let back = calculate_tax(inclusive.taxable, rate, TaxTreatment::Exclusive).unwrap();
            let diff = (back.gross - amount).abs();
            prop_assert!(diff <= Money::new(dec!(0.005)), "diff {:?}", diff);
        }

        /// Per-code amounts always sum to the line's total tax.
        #[test]
        fn code_taxes_sum_to_total(qty in 1i64..1_000, price in 1i64..10_000) {
            let line = TaxLine {
                quantity: qty,
                unit_price: Money::from_major(price),
                discount: Discount::None,
                tax_codes: vec![TaxCode::from("GST"), TaxCode::from("WHT"), TaxCode::from("CESS")],
            };
            let lt = calculate_line_tax(&line, &Rates::standard(), TaxTreatment::Exclusive, now())
                .unwrap();
            let sum: Money = lt.taxes.iter().map(|(_, t)| *t).sum();
            prop_assert_eq!(sum, lt.total_tax);
        }
    }
}
