use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postledger_core::{DomainError, DomainResult, EntryId, Money, Reference};

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1200"
    pub name: String, // e.g. "Accounts Receivable"
    pub kind: AccountKind,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }
}

/// One immutable ledger entry: exactly one of debit/credit is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account: Account,
    pub date: DateTime<Utc>,
    pub description: String,
    pub debit: Money,
    pub credit: Money,
    pub reference: Reference,
}

impl LedgerEntry {
    pub fn debit(
        account: Account,
        amount: Money,
        date: DateTime<Utc>,
        description: impl Into<String>,
        reference: Reference,
    ) -> Self {
        Self {
            id: EntryId::new(),
            account,
            date,
            description: description.into(),
            debit: amount,
            credit: Money::ZERO,
            reference,
        }
    }

    pub fn credit(
        account: Account,
        amount: Money,
        date: DateTime<Utc>,
        description: impl Into<String>,
        reference: Reference,
    ) -> Self {
        Self {
            id: EntryId::new(),
            account,
            date,
            description: description.into(),
            debit: Money::ZERO,
            credit: amount,
            reference,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if self.account.code.trim().is_empty() {
            return Err(DomainError::validation("account", "entry requires an account"));
        }
        if self.debit.is_negative() || self.credit.is_negative() {
            return Err(DomainError::invariant("entry amounts cannot be negative"));
        }
        match (self.debit.is_positive(), self.credit.is_positive()) {
            (true, false) | (false, true) => Ok(()),
            _ => Err(DomainError::invariant(
                "exactly one of debit/credit must be positive",
            )),
        }
    }
}

/// A balanced batch produced by one posting operation.
///
/// Construction is the only way to obtain a batch, so an imbalance can never
/// reach storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBatch {
    entries: Vec<LedgerEntry>,
}

impl LedgerBatch {
    pub fn new(entries: Vec<LedgerEntry>) -> DomainResult<Self> {
        if entries.is_empty() {
            return Err(DomainError::validation("entries", "batch must have entries"));
        }
        for entry in &entries {
            entry.validate()?;
        }

        let debits: Money = entries.iter().map(|e| e.debit).sum();
        let credits: Money = entries.iter().map(|e| e.credit).sum();
        if debits != credits {
            return Err(DomainError::LedgerImbalance {
                debits: debits.amount(),
                credits: credits.amount(),
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LedgerEntry> {
        self.entries
    }

    pub fn debit_total(&self) -> Money {
        self.entries.iter().map(|e| e.debit).sum()
    }

    pub fn credit_total(&self) -> Money {
        self.entries.iter().map(|e| e.credit).sum()
    }

    /// Account codes touched by this batch (for cache invalidation).
    pub fn account_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.entries.iter().map(|e| e.account.code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postledger_core::TransactionId;

    fn account(code: &str, kind: AccountKind) -> Account {
        Account::new(code, code, kind)
    }

    fn reference() -> Reference {
        Reference::transaction(TransactionId::new())
    }

    #[test]
    fn balanced_batch_is_accepted() {
        let date = Utc::now();
        let batch = LedgerBatch::new(vec![
            LedgerEntry::debit(
                account("1200", AccountKind::Asset),
                Money::from_major(118),
                date,
                "test",
                reference(),
            ),
            LedgerEntry::credit(
                account("4000", AccountKind::Revenue),
                Money::from_major(100),
                date,
                "test",
                reference(),
            ),
            LedgerEntry::credit(
                account("2150", AccountKind::Liability),
                Money::from_major(18),
                date,
                "test",
                reference(),
            ),
        ])
        .unwrap();
        assert_eq!(batch.debit_total(), batch.credit_total());
        assert_eq!(batch.account_codes(), vec!["1200", "2150", "4000"]);
    }

    #[test]
    fn unbalanced_batch_is_a_ledger_imbalance() {
        let date = Utc::now();
        let err = LedgerBatch::new(vec![
            LedgerEntry::debit(
                account("1200", AccountKind::Asset),
                Money::from_major(100),
                date,
                "test",
                reference(),
            ),
            LedgerEntry::credit(
                account("4000", AccountKind::Revenue),
                Money::from_major(90),
                date,
                "test",
                reference(),
            ),
        ])
        .unwrap_err();
        assert!(matches!(err, DomainError::LedgerImbalance { .. }));
    }

    #[test]
    fn entry_must_have_exactly_one_positive_side() {
        let date = Utc::now();
        let mut entry = LedgerEntry::debit(
            account("1200", AccountKind::Asset),
            Money::from_major(10),
            date,
            "test",
            reference(),
        );
        entry.credit = Money::from_major(10);
        let err = LedgerBatch::new(vec![entry]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let zero = LedgerEntry::debit(
            account("1200", AccountKind::Asset),
            Money::ZERO,
            date,
            "test",
            reference(),
        );
        assert!(LedgerBatch::new(vec![zero]).is_err());
    }

    #[test]
    fn entry_requires_an_account() {
        let date = Utc::now();
        let entry = LedgerEntry::debit(
            account("", AccountKind::Asset),
            Money::from_major(10),
            date,
            "test",
            reference(),
        );
        assert!(matches!(
            LedgerBatch::new(vec![entry]),
            Err(DomainError::Validation { .. })
        ));
    }
}
