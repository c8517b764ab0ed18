//! Posting builders for sales, purchases and their returns.
//!
//! Each builder turns a confirmed transaction's totals into a balanced
//! [`LedgerBatch`]. Entry amounts are presentation values (rounded once per
//! component); the receivable/payable side is computed as the sum of the
//! rounded components so the batch balances to the cent by construction.
//! A document whose rounded components are all zero (e.g. a zero-priced
//! invoice) has no ledger effect: the builders return `None` and nothing is
//! posted.

use serde::{Deserialize, Serialize};

use postledger_core::{DomainError, DomainResult, Money, Reference};
use postledger_transactions::{Transaction, TransactionKind, TransactionStatus};

use crate::entry::{Account, AccountKind, LedgerBatch, LedgerEntry};

/// The accounts posting operations write to, injected as configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub accounts_receivable: Account,
    pub accounts_payable: Account,
    pub revenue: Account,
    pub purchases: Account,
    pub discounts_allowed: Account,
    pub discounts_received: Account,
    /// Tax collected on sales (liability until remitted).
    pub tax_output: Account,
    /// Tax paid on purchases (recoverable input credit).
    pub tax_input: Account,
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self {
            accounts_receivable: Account::new("1200", "Accounts Receivable", AccountKind::Asset),
            accounts_payable: Account::new("2100", "Accounts Payable", AccountKind::Liability),
            revenue: Account::new("4000", "Sales Revenue", AccountKind::Revenue),
            purchases: Account::new("5000", "Purchases", AccountKind::Expense),
            discounts_allowed: Account::new("5100", "Discounts Allowed", AccountKind::Expense),
            discounts_received: Account::new("4900", "Discounts Received", AccountKind::Revenue),
            tax_output: Account::new("2150", "Tax Output", AccountKind::Liability),
            tax_input: Account::new("1150", "Tax Input", AccountKind::Asset),
        }
    }
}

/// Rounded monetary pieces shared by all four builders.
struct Pieces {
    subtotal: Money,
    discount: Money,
    taxes: Vec<(String, Money)>,
    /// subtotal - discount + taxes, from the rounded parts.
    settlement: Money,
}

fn pieces(txn: &Transaction) -> Pieces {
    let totals = txn.totals();
    let subtotal = totals.subtotal.rounded().abs();
    let discount = totals.total_discount.rounded().abs();
    let taxes: Vec<(String, Money)> = totals
        .tax_by_code
        .iter()
        .map(|(code, amount)| (code.to_string(), amount.rounded().abs()))
        .filter(|(_, amount)| amount.is_positive())
        .collect();
    let tax_sum: Money = taxes.iter().map(|(_, t)| *t).sum();
    Pieces {
        subtotal,
        discount,
        taxes,
        settlement: subtotal - discount + tax_sum,
    }
}

/// Zero-valued components post no entry at all (a fully discounted sale has
/// no receivable side, only revenue against discount).
fn push_debit(
    entries: &mut Vec<LedgerEntry>,
    account: &Account,
    amount: Money,
    date: chrono::DateTime<chrono::Utc>,
    description: &str,
    reference: &Reference,
) {
    if amount.is_positive() {
        entries.push(LedgerEntry::debit(
            account.clone(),
            amount,
            date,
            description,
            reference.clone(),
        ));
    }
}

fn push_credit(
    entries: &mut Vec<LedgerEntry>,
    account: &Account,
    amount: Money,
    date: chrono::DateTime<chrono::Utc>,
    description: &str,
    reference: &Reference,
) {
    if amount.is_positive() {
        entries.push(LedgerEntry::credit(
            account.clone(),
            amount,
            date,
            description,
            reference.clone(),
        ));
    }
}

/// No entries means the document had no monetary effect; there is nothing
/// to post and nothing to balance.
fn batch(entries: Vec<LedgerEntry>) -> DomainResult<Option<LedgerBatch>> {
    if entries.is_empty() {
        return Ok(None);
    }
    LedgerBatch::new(entries).map(Some)
}

fn ensure_postable(txn: &Transaction, kind: TransactionKind) -> DomainResult<()> {
    if txn.kind() != kind {
        return Err(DomainError::validation(
            "kind",
            format!("expected a {kind:?}, found {:?}", txn.kind()),
        ));
    }
    if txn.status() != TransactionStatus::Confirmed {
        return Err(DomainError::invariant(
            "only confirmed transactions are posted to the ledger",
        ));
    }
    Ok(())
}

fn ensure_linked(ret: &Transaction, original: &Transaction) -> DomainResult<()> {
    if ret.original_transaction_id() != Some(original.id()) {
        return Err(DomainError::invariant(
            "return does not reference the given original transaction",
        ));
    }
    original.ensure_reversible_by(ret.kind())
}

/// Sale: debit AR for the settlement total; credit revenue for the subtotal;
/// credit one tax entry per code; debit discounts allowed when discounted.
pub fn post_for_sale(
    txn: &Transaction,
    accounts: &ChartOfAccounts,
) -> DomainResult<Option<LedgerBatch>> {
    ensure_postable(txn, TransactionKind::Sale)?;
    let p = pieces(txn);
    let date = txn.date();
    let reference = Reference::transaction(txn.id());
    let description = format!("Invoice {}", txn.reference());

    let mut entries = Vec::new();
    push_debit(
        &mut entries,
        &accounts.accounts_receivable,
        p.settlement,
        date,
        &description,
        &reference,
    );
    push_credit(
        &mut entries,
        &accounts.revenue,
        p.subtotal,
        date,
        &description,
        &reference,
    );
    for (code, amount) in &p.taxes {
        push_credit(
            &mut entries,
            &accounts.tax_output,
            *amount,
            date,
            &format!("{code} output on {}", txn.reference()),
            &reference,
        );
    }
    push_debit(
        &mut entries,
        &accounts.discounts_allowed,
        p.discount,
        date,
        &description,
        &reference,
    );

    batch(entries)
}

/// Sale return: the sale posting with sides flipped. Dated at the return's
/// own date and described by the return's reference number.
pub fn post_for_sale_return(
    ret: &Transaction,
    original: &Transaction,
    accounts: &ChartOfAccounts,
) -> DomainResult<Option<LedgerBatch>> {
    ensure_postable(ret, TransactionKind::ReturnOfSale)?;
    ensure_linked(ret, original)?;
    let p = pieces(ret);
    let date = ret.date();
    let reference = Reference::transaction(ret.id());
    let description = format!("Sales return {}", ret.reference());

    let mut entries = Vec::new();
    push_debit(
        &mut entries,
        &accounts.revenue,
        p.subtotal,
        date,
        &description,
        &reference,
    );
    push_credit(
        &mut entries,
        &accounts.accounts_receivable,
        p.settlement,
        date,
        &description,
        &reference,
    );
    for (code, amount) in &p.taxes {
        push_debit(
            &mut entries,
            &accounts.tax_output,
            *amount,
            date,
            &format!("{code} output reversal on {}", ret.reference()),
            &reference,
        );
    }
    push_credit(
        &mut entries,
        &accounts.discounts_allowed,
        p.discount,
        date,
        &description,
        &reference,
    );

    batch(entries)
}

/// Purchase: debit purchases and tax input; credit AP for the settlement.
pub fn post_for_purchase(
    txn: &Transaction,
    accounts: &ChartOfAccounts,
) -> DomainResult<Option<LedgerBatch>> {
    ensure_postable(txn, TransactionKind::Purchase)?;
    let p = pieces(txn);
    let date = txn.date();
    let reference = Reference::transaction(txn.id());
    let description = format!("Purchase {}", txn.reference());

    let mut entries = Vec::new();
    push_debit(
        &mut entries,
        &accounts.purchases,
        p.subtotal,
        date,
        &description,
        &reference,
    );
    push_credit(
        &mut entries,
        &accounts.accounts_payable,
        p.settlement,
        date,
        &description,
        &reference,
    );
    for (code, amount) in &p.taxes {
        push_debit(
            &mut entries,
            &accounts.tax_input,
            *amount,
            date,
            &format!("{code} input on {}", txn.reference()),
            &reference,
        );
    }
    push_credit(
        &mut entries,
        &accounts.discounts_received,
        p.discount,
        date,
        &description,
        &reference,
    );

    batch(entries)
}

/// Purchase return: the purchase posting with sides flipped.
pub fn post_for_purchase_return(
    ret: &Transaction,
    original: &Transaction,
    accounts: &ChartOfAccounts,
) -> DomainResult<Option<LedgerBatch>> {
    ensure_postable(ret, TransactionKind::ReturnOfPurchase)?;
    ensure_linked(ret, original)?;
    let p = pieces(ret);
    let date = ret.date();
    let reference = Reference::transaction(ret.id());
    let description = format!("Purchase return {}", ret.reference());

    let mut entries = Vec::new();
    push_debit(
        &mut entries,
        &accounts.accounts_payable,
        p.settlement,
        date,
        &description,
        &reference,
    );
    push_credit(
        &mut entries,
        &accounts.purchases,
        p.subtotal,
        date,
        &description,
        &reference,
    );
    for (code, amount) in &p.taxes {
        push_credit(
            &mut entries,
            &accounts.tax_input,
            *amount,
            date,
            &format!("{code} input reversal on {}", ret.reference()),
            &reference,
        );
    }
    push_debit(
        &mut entries,
        &accounts.discounts_received,
        p.discount,
        date,
        &description,
        &reference,
    );

    batch(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    use postledger_core::{CounterpartyId, ItemId, TransactionId};
    use postledger_tax::{
        Discount, TaxCode, TaxRate, TaxRateLookup, TaxRateRecord, TaxTreatment,
    };
    use postledger_transactions::TransactionLine;

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

    fn confirmed(
        kind: TransactionKind,
        original: Option<TransactionId>,
        lines: Vec<TransactionLine>,
    ) -> Transaction {
        let mut txn = Transaction::draft(
            TransactionId::new(),
            kind,
            CounterpartyId::new(),
            format!("{}-000042", kind.reference_prefix()),
            Utc::now(),
            original,
            TaxTreatment::Exclusive,
            lines,
        )
        .unwrap();
        txn.compute_totals(&gst_rates()).unwrap();
        txn.confirm().unwrap();
        txn
    }

    fn line(item_id: ItemId, quantity: i64, price: i64, discount: Discount) -> TransactionLine {
        TransactionLine {
            item_id,
            quantity,
            unit_price: Money::from_major(price),
            discount,
            tax_codes: vec![TaxCode::from("GST")],
            warehouse_id: None,
        }
    }

    #[test]
    fn sale_return_posting_matches_the_worked_example() {
        // Original sale: 10 units @ 100, GST 18%. Return 5 units:
        // debit Revenue 500, credit AR 590, debit GST output 90.
        let item = ItemId::new();
        let original = confirmed(
            TransactionKind::Sale,
            None,
            vec![line(item, 10, 100, Discount::None)],
        );
        let ret = confirmed(
            TransactionKind::ReturnOfSale,
            Some(original.id()),
            vec![line(item, -5, 100, Discount::None)],
        );

        let batch = post_for_sale_return(&ret, &original, &ChartOfAccounts::default())
            .unwrap()
            .unwrap();
        let entries = batch.entries();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].account.code, "4000");
        assert_eq!(entries[0].debit, Money::from_major(500));
        assert_eq!(entries[1].account.code, "1200");
        assert_eq!(entries[1].credit, Money::from_major(590));
        assert_eq!(entries[2].account.code, "2150");
        assert_eq!(entries[2].debit, Money::from_major(90));

        assert_eq!(batch.debit_total(), Money::from_major(590));
        assert_eq!(batch.credit_total(), Money::from_major(590));

        // Dated at the return's date, described with the return's reference.
        assert_eq!(entries[0].date, ret.date());
        assert!(entries[0].description.contains(ret.reference()));
        assert!(!entries[0].description.contains(original.reference()));
    }

    #[test]
    fn sale_posting_splits_settlement_revenue_and_tax() {
        let item = ItemId::new();
        let txn = confirmed(
            TransactionKind::Sale,
            None,
            vec![line(item, 100, 100, Discount::None)],
        );
        let batch = post_for_sale(&txn, &ChartOfAccounts::default()).unwrap().unwrap();

        assert_eq!(batch.entries().len(), 3);
        assert_eq!(batch.entries()[0].debit, Money::from_major(11_800));
        assert_eq!(batch.entries()[1].credit, Money::from_major(10_000));
        assert_eq!(batch.entries()[2].credit, Money::from_major(1_800));
    }

    #[test]
    fn zero_tax_produces_no_tax_entry() {
        let item = ItemId::new();
        let mut no_tax = line(item, 10, 50, Discount::None);
        no_tax.tax_codes.clear();
        let txn = confirmed(TransactionKind::Sale, None, vec![no_tax]);
        let batch = post_for_sale(&txn, &ChartOfAccounts::default()).unwrap().unwrap();
        assert_eq!(batch.entries().len(), 2);
    }

    #[test]
    fn zero_valued_documents_post_nothing() {
        // A zero-priced sale is a valid document with no monetary effect.
        let item = ItemId::new();
        let txn = confirmed(
            TransactionKind::Sale,
            None,
            vec![line(item, 5, 0, Discount::None)],
        );
        assert!(post_for_sale(&txn, &ChartOfAccounts::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn discounted_sale_stays_balanced_with_a_discount_entry() {
        let item = ItemId::new();
        let txn = confirmed(
            TransactionKind::Sale,
            None,
            vec![line(item, 10, 100, Discount::Percent(dec!(10)))],
        );
        let batch = post_for_sale(&txn, &ChartOfAccounts::default()).unwrap().unwrap();

        // Revenue 1000, discount 100, GST on 900 = 162, AR 1062.
        let discount_entry = batch
            .entries()
            .iter()
            .find(|e| e.account.code == "5100")
            .unwrap();
        assert_eq!(discount_entry.debit, Money::from_major(100));
        assert_eq!(batch.debit_total(), Money::new(dec!(1162.00)));
        assert_eq!(batch.debit_total(), batch.credit_total());
    }

    #[test]
    fn purchase_and_purchase_return_mirror_each_other() {
        let item = ItemId::new();
        let original = confirmed(
            TransactionKind::Purchase,
            None,
            vec![line(item, 10, 100, Discount::None)],
        );
        let accounts = ChartOfAccounts::default();
        let purchase = post_for_purchase(&original, &accounts).unwrap().unwrap();
        assert_eq!(purchase.entries()[0].debit, Money::from_major(1_000)); // purchases
        assert_eq!(purchase.entries()[1].credit, Money::from_major(1_180)); // AP

        let ret = confirmed(
            TransactionKind::ReturnOfPurchase,
            Some(original.id()),
            vec![line(item, -4, 100, Discount::None)],
        );
        let reversal = post_for_purchase_return(&ret, &original, &accounts)
            .unwrap()
            .unwrap();
        assert_eq!(reversal.entries()[0].debit, Money::new(dec!(472.00))); // AP
        assert_eq!(reversal.entries()[1].credit, Money::from_major(400)); // purchases
        assert_eq!(reversal.debit_total(), reversal.credit_total());
    }

    #[test]
    fn builders_reject_mismatched_documents() {
        let item = ItemId::new();
        let sale = confirmed(
            TransactionKind::Sale,
            None,
            vec![line(item, 1, 100, Discount::None)],
        );
        let accounts = ChartOfAccounts::default();
        assert!(post_for_purchase(&sale, &accounts).is_err());

        // A return posted against the wrong original is refused.
        let other = confirmed(
            TransactionKind::Sale,
            None,
            vec![line(item, 1, 100, Discount::None)],
        );
        let ret = confirmed(
            TransactionKind::ReturnOfSale,
            Some(sale.id()),
            vec![line(item, -1, 100, Discount::None)],
        );
        assert!(post_for_sale_return(&ret, &other, &accounts).is_err());
    }

    proptest! {
        /// Every generated sale posting balances to the cent, with or
        /// without discounts and tax.
        #[test]
        fn sale_postings_always_balance(
            quantity in 1i64..1_000,
            price_cents in 1i64..1_000_000,
            discount_pct in 0u32..=100,
            taxed in proptest::bool::ANY,
        ) {
            let mut l = TransactionLine {
                item_id: ItemId::new(),
                quantity,
                unit_price: Money::new(Decimal::new(price_cents, 2)),
                discount: Discount::Percent(Decimal::from(discount_pct)),
                tax_codes: vec![],
                warehouse_id: None,
            };
            if taxed {
                l.tax_codes.push(TaxCode::from("GST"));
            }
            let txn = confirmed(TransactionKind::Sale, None, vec![l]);
            let batch = post_for_sale(&txn, &ChartOfAccounts::default()).unwrap().unwrap();
            prop_assert_eq!(batch.debit_total(), batch.credit_total());
        }
    }
}
