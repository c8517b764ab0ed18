use serde::{Deserialize, Serialize};

use postledger_core::{DomainError, DomainResult, ItemId};
use postledger_transactions::{Transaction, TransactionStatus};

/// One requested return line, as a positive magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedReturn {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// A requested line that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedReturn {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Outcome of validating a whole return request.
///
/// Errors are collected per item rather than failing fast, so a caller can
/// report every problem in one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<DomainError>,
    pub validated: Vec<ValidatedReturn>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A returnable original line, annotated for return-entry callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnableLine {
    pub item_id: ItemId,
    pub original_quantity: i64,
    pub already_returned: i64,
    pub available: i64,
}

/// The original transaction together with its prior returns.
///
/// Cancelled returns do not consume returnable quantity and are filtered out
/// at construction.
#[derive(Debug)]
pub struct ReturnHistory<'a> {
    original: &'a Transaction,
    prior_returns: Vec<&'a Transaction>,
}

impl<'a> ReturnHistory<'a> {
    pub fn new(
        original: &'a Transaction,
        returns: impl IntoIterator<Item = &'a Transaction>,
    ) -> DomainResult<Self> {
        let mut prior_returns = Vec::new();
        for ret in returns {
            if ret.original_transaction_id() != Some(original.id()) {
                return Err(DomainError::invariant(
                    "return in history does not reference the original transaction",
                ));
            }
            if ret.kind().original_kind() != Some(original.kind()) {
                return Err(DomainError::invariant(
                    "return kind does not complement the original transaction",
                ));
            }
            if ret.status() != TransactionStatus::Cancelled {
                prior_returns.push(ret);
            }
        }
        Ok(Self {
            original,
            prior_returns,
        })
    }

    pub fn original(&self) -> &Transaction {
        self.original
    }

    /// Total absolute quantity already returned for `item_id`, summed over
    /// every matching line of every prior return.
    pub fn already_returned(&self, item_id: ItemId) -> i64 {
        self.prior_returns
            .iter()
            .flat_map(|r| r.lines())
            .filter(|line| line.item_id == item_id)
            .map(|line| line.abs_quantity())
            .sum()
    }

    /// Quantity of `item_id` still available to return. A document may carry
    /// the same item on more than one line; availability is the sum.
    pub fn returnable(&self, item_id: ItemId) -> DomainResult<i64> {
        let original = self.original_quantity(item_id);
        if original == 0 {
            return Err(DomainError::ItemNotInOriginalTransaction {
                item_id: item_id.to_string(),
            });
        }
        Ok(original - self.already_returned(item_id))
    }

    fn original_quantity(&self, item_id: ItemId) -> i64 {
        self.original
            .lines()
            .iter()
            .filter(|line| line.item_id == item_id)
            .map(|line| line.abs_quantity())
            .sum()
    }

    /// Validate a batch of requested lines, collecting per-item errors.
    pub fn validate(&self, requested: &[RequestedReturn]) -> ValidationReport {
        let mut report = ValidationReport {
            errors: Vec::new(),
            validated: Vec::new(),
        };

        if requested.is_empty() {
            report.errors.push(DomainError::validation(
                "items",
                "a return must request at least one item",
            ));
            return report;
        }

        // A request may name the same item more than once. Quantities are
        // summed per item before the availability check, so duplicates cannot
        // each pass against the same returnable balance.
        let mut totals: Vec<(ItemId, i64)> = Vec::new();
        for request in requested {
            if request.quantity <= 0 {
                report.errors.push(DomainError::invalid_quantity(format!(
                    "return quantity for item {} must be positive",
                    request.item_id
                )));
                continue;
            }
            match totals.iter_mut().find(|(id, _)| *id == request.item_id) {
                Some((_, total)) => *total += request.quantity,
                None => totals.push((request.item_id, request.quantity)),
            }
        }

        for (item_id, quantity) in totals {
            match self.returnable(item_id) {
                Err(err) => report.errors.push(err),
                Ok(available) if quantity > available => {
                    report.errors.push(DomainError::OverReturn {
                        item_id: item_id.to_string(),
                        requested: quantity,
                        returnable: available,
                    });
                }
                Ok(_) => report.validated.push(ValidatedReturn { item_id, quantity }),
            }
        }

        report
    }

    /// Every original item with remaining availability, annotated with the
    /// original and already-returned quantities. One entry per item, even
    /// when the original spread it over several lines.
    pub fn list_returnable(&self) -> Vec<ReturnableLine> {
        let mut listed: Vec<ReturnableLine> = Vec::new();
        for line in self.original.lines() {
            if listed.iter().any(|l| l.item_id == line.item_id) {
                continue;
            }
            let original_quantity = self.original_quantity(line.item_id);
            let already = self.already_returned(line.item_id);
            let available = original_quantity - already;
            if available > 0 {
                listed.push(ReturnableLine {
                    item_id: line.item_id,
                    original_quantity,
                    already_returned: already,
                    available,
                });
            }
        }
        listed
    }
}
