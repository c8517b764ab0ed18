use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postledger_core::{
    CounterpartyId, DomainError, DomainResult, ItemId, Money, TransactionId, WarehouseId,
};
use postledger_tax::{
    calculate_invoice_tax, Discount, InvoiceTotals, TaxCode, TaxLine, TaxRateLookup, TaxTreatment,
};

/// Direction of the underlying trade, or a reversal of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Purchase,
    ReturnOfSale,
    ReturnOfPurchase,
}

impl TransactionKind {
    pub fn is_return(self) -> bool {
        matches!(self, Self::ReturnOfSale | Self::ReturnOfPurchase)
    }

    /// The non-return kind a return of this kind must reference.
    pub fn original_kind(self) -> Option<TransactionKind> {
        match self {
            Self::ReturnOfSale => Some(Self::Sale),
            Self::ReturnOfPurchase => Some(Self::Purchase),
            _ => None,
        }
    }

    /// The return kind that reverses this kind.
    pub fn return_kind(self) -> Option<TransactionKind> {
        match self {
            Self::Sale => Some(Self::ReturnOfSale),
            Self::Purchase => Some(Self::ReturnOfPurchase),
            _ => None,
        }
    }

    /// Prefix for generated human-readable reference numbers.
    pub fn reference_prefix(self) -> &'static str {
        match self {
            Self::Sale => "INV",
            Self::Purchase => "PUR",
            Self::ReturnOfSale | Self::ReturnOfPurchase => "RET",
        }
    }
}

/// Document lifecycle.
///
/// Confirmation is what triggers stock and ledger side effects; a confirmed
/// document is only ever corrected by a compensating return, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Draft,
    Confirmed,
    Cancelled,
}

/// One document line.
///
/// `quantity` is signed: positive on sales/purchases, negative on returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Discount,
    pub tax_codes: Vec<TaxCode>,
    pub warehouse_id: Option<WarehouseId>,
}

impl TransactionLine {
    pub fn abs_quantity(&self) -> i64 {
        self.quantity.abs()
    }

    fn as_tax_line(&self) -> TaxLine {
        TaxLine {
            quantity: self.abs_quantity(),
            unit_price: self.unit_price,
            discount: self.discount,
            tax_codes: self.tax_codes.clone(),
        }
    }
}

/// An invoice or return document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    kind: TransactionKind,
    counterparty_id: CounterpartyId,
    /// Human-readable reference (e.g. `INV-000042`).
    reference: String,
    date: DateTime<Utc>,
    status: TransactionStatus,
    original_transaction_id: Option<TransactionId>,
    tax_treatment: TaxTreatment,
    lines: Vec<TransactionLine>,
    totals: InvoiceTotals,
}

impl Transaction {
    /// Create a draft document, validating line signs and the return linkage.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        id: TransactionId,
        kind: TransactionKind,
        counterparty_id: CounterpartyId,
        reference: String,
        date: DateTime<Utc>,
        original_transaction_id: Option<TransactionId>,
        tax_treatment: TaxTreatment,
        lines: Vec<TransactionLine>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("lines", "transaction must have lines"));
        }
        match (kind.is_return(), original_transaction_id) {
            (true, None) => {
                return Err(DomainError::validation(
                    "original_transaction_id",
                    "a return must reference its original transaction",
                ));
            }
            (false, Some(_)) => {
                return Err(DomainError::validation(
                    "original_transaction_id",
                    "only returns may reference an original transaction",
                ));
            }
            _ => {}
        }
        for line in &lines {
            if line.quantity == 0 {
                return Err(DomainError::invalid_quantity("line quantity cannot be zero"));
            }
            if kind.is_return() && line.quantity > 0 {
                return Err(DomainError::invalid_quantity(
                    "return line quantities are stored negative",
                ));
            }
            if !kind.is_return() && line.quantity < 0 {
                return Err(DomainError::invalid_quantity(
                    "line quantity must be positive on a non-return",
                ));
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::invalid_quantity("unit price cannot be negative"));
            }
        }

        Ok(Self {
            id,
            kind,
            counterparty_id,
            reference,
            date,
            status: TransactionStatus::Draft,
            original_transaction_id,
            tax_treatment,
            lines,
            totals: InvoiceTotals::default(),
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn counterparty_id(&self) -> CounterpartyId {
        self.counterparty_id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn original_transaction_id(&self) -> Option<TransactionId> {
        self.original_transaction_id
    }

    pub fn tax_treatment(&self) -> TaxTreatment {
        self.tax_treatment
    }

    pub fn lines(&self) -> &[TransactionLine] {
        &self.lines
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    pub fn line_for(&self, item_id: ItemId) -> Option<&TransactionLine> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    /// Recompute monetary totals from the lines (absolute quantities).
    pub fn compute_totals(&mut self, lookup: &impl TaxRateLookup) -> DomainResult<()> {
        let tax_lines: Vec<TaxLine> = self.lines.iter().map(TransactionLine::as_tax_line).collect();
        self.totals = calculate_invoice_tax(&tax_lines, lookup, self.tax_treatment, self.date)?;
        Ok(())
    }

    /// Confirm a draft. Side effects (stock, ledger) are staged by the caller
    /// in the same unit of work.
    pub fn confirm(&mut self) -> DomainResult<()> {
        match self.status {
            TransactionStatus::Draft => {
                self.status = TransactionStatus::Confirmed;
                Ok(())
            }
            TransactionStatus::Confirmed => {
                Err(DomainError::invariant("transaction is already confirmed"))
            }
            TransactionStatus::Cancelled => {
                Err(DomainError::invariant("cannot confirm a cancelled transaction"))
            }
        }
    }

    /// Cancel a draft. Confirmed documents are corrected by a compensating
    /// return instead; posted records are never unwound in place.
    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.status {
            TransactionStatus::Draft => {
                self.status = TransactionStatus::Cancelled;
                Ok(())
            }
            _ => Err(DomainError::invariant(
                "only draft transactions can be cancelled directly",
            )),
        }
    }

    /// Check that this document may act as the original for `return_kind`.
    pub fn ensure_reversible_by(&self, return_kind: TransactionKind) -> DomainResult<()> {
        let expected = return_kind.original_kind().ok_or_else(|| {
            DomainError::validation("kind", "not a return kind")
        })?;
        if self.kind != expected {
            return Err(DomainError::validation(
                "original_transaction_id",
                format!(
                    "a {return_kind:?} must reference a {expected:?}, found {:?}",
                    self.kind
                ),
            ));
        }
        if self.status != TransactionStatus::Confirmed {
            return Err(DomainError::invariant(
                "only confirmed transactions can be returned against",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    use postledger_tax::{TaxRate, TaxRateRecord};

    struct Rates(BTreeMap<TaxCode, TaxRateRecord>);

    impl TaxRateLookup for Rates {
        fn rate(&self, code: &TaxCode) -> Option<TaxRateRecord> {
            self.0.get(code).copied()
        }
    }

    fn gst_rates() -> Rates {
        let mut map = BTreeMap::new();
        map.insert(
            TaxCode::from("GST"),
            TaxRateRecord {
                rate: TaxRate::new(dec!(0.18)).unwrap(),
                compounding: false,
                active_from: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            },
        );
        Rates(map)
    }

    fn line(quantity: i64) -> TransactionLine {
        TransactionLine {
            item_id: ItemId::new(),
            quantity,
            unit_price: Money::from_major(100),
            discount: Discount::None,
            tax_codes: vec![TaxCode::from("GST")],
            warehouse_id: None,
        }
    }

    fn sale(lines: Vec<TransactionLine>) -> DomainResult<Transaction> {
        Transaction::draft(
            TransactionId::new(),
            TransactionKind::Sale,
            CounterpartyId::new(),
            "INV-000001".to_string(),
            Utc::now(),
            None,
            TaxTreatment::Exclusive,
            lines,
        )
    }

    #[test]
    fn sale_totals_follow_the_tax_engine() {
        let mut txn = sale(vec![line(10)]).unwrap();
        txn.compute_totals(&gst_rates()).unwrap();
        assert_eq!(txn.totals().subtotal, Money::from_major(1_000));
        assert_eq!(txn.totals().total_tax.rounded(), Money::from_major(180));
        assert_eq!(txn.totals().grand_total.rounded(), Money::from_major(1_180));
    }

    #[test]
    fn return_totals_use_absolute_quantities() {
        let original = TransactionId::new();
        let mut ret = Transaction::draft(
            TransactionId::new(),
            TransactionKind::ReturnOfSale,
            CounterpartyId::new(),
            "RET-000001".to_string(),
            Utc::now(),
            Some(original),
            TaxTreatment::Exclusive,
            vec![line(-5)],
        )
        .unwrap();
        ret.compute_totals(&gst_rates()).unwrap();
        assert_eq!(ret.totals().subtotal, Money::from_major(500));
        assert_eq!(ret.totals().grand_total.rounded(), Money::from_major(590));
    }

    #[test]
    fn line_sign_must_match_kind() {
        assert!(matches!(
            sale(vec![line(-1)]),
            Err(DomainError::InvalidQuantity(_))
        ));
        let err = Transaction::draft(
            TransactionId::new(),
            TransactionKind::ReturnOfSale,
            CounterpartyId::new(),
            "RET-000002".to_string(),
            Utc::now(),
            Some(TransactionId::new()),
            TaxTreatment::Exclusive,
            vec![line(5)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn return_linkage_is_validated_both_ways() {
        let err = Transaction::draft(
            TransactionId::new(),
            TransactionKind::ReturnOfSale,
            CounterpartyId::new(),
            "RET-000003".to_string(),
            Utc::now(),
            None,
            TaxTreatment::Exclusive,
            vec![line(-1)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. }
            if field == "original_transaction_id"));

        let err = Transaction::draft(
            TransactionId::new(),
            TransactionKind::Sale,
            CounterpartyId::new(),
            "INV-000009".to_string(),
            Utc::now(),
            Some(TransactionId::new()),
            TaxTreatment::Exclusive,
            vec![line(1)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. }
            if field == "original_transaction_id"));
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        let mut txn = sale(vec![line(1)]).unwrap();
        assert_eq!(txn.status(), TransactionStatus::Draft);
        txn.confirm().unwrap();
        assert_eq!(txn.status(), TransactionStatus::Confirmed);
        assert!(txn.confirm().is_err());
        // A confirmed document cannot be cancelled in place.
        assert!(txn.cancel().is_err());

        let mut draft = sale(vec![line(1)]).unwrap();
        draft.cancel().unwrap();
        assert!(draft.confirm().is_err());
    }

    #[test]
    fn reversibility_checks_kind_and_status() {
        let mut original = sale(vec![line(10)]).unwrap();
        assert!(original
            .ensure_reversible_by(TransactionKind::ReturnOfSale)
            .is_err());
        original.confirm().unwrap();
        original
            .ensure_reversible_by(TransactionKind::ReturnOfSale)
            .unwrap();
        assert!(original
            .ensure_reversible_by(TransactionKind::ReturnOfPurchase)
            .is_err());
    }
}
