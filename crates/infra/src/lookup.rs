//! Reference-data lookups: the item catalog and the tax-rate table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use postledger_core::quantity::DEFAULT_BOXES_PER_CARTON;
use postledger_core::ItemId;
use postledger_tax::{TaxCode, TaxRateLookup, TaxRateRecord};

/// Catalog entry for a sellable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    /// Inactive items are kept for history but refuse new document lines.
    pub active: bool,
    /// Units per box.
    pub pack_size: i64,
    pub boxes_per_carton: i64,
    /// Applied when a document line carries no tax codes of its own.
    pub default_tax_codes: Vec<TaxCode>,
}

impl ItemRecord {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            pack_size: 1,
            boxes_per_carton: DEFAULT_BOXES_PER_CARTON,
            default_tax_codes: Vec::new(),
        }
    }
}

/// Read access to the item catalog.
pub trait ItemCatalog: Send + Sync {
    fn item(&self, id: ItemId) -> Option<ItemRecord>;
}

impl<C> ItemCatalog for Arc<C>
where
    C: ItemCatalog + ?Sized,
{
    fn item(&self, id: ItemId) -> Option<ItemRecord> {
        (**self).item(id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<HashMap<ItemId, ItemRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: ItemRecord) {
        if let Ok(mut items) = self.items.write() {
            items.insert(record.id, record);
        }
    }
}

impl ItemCatalog for InMemoryCatalog {
    fn item(&self, id: ItemId) -> Option<ItemRecord> {
        self.items.read().ok()?.get(&id).cloned()
    }
}

/// In-memory tax-rate table keyed by code.
#[derive(Debug, Default)]
pub struct InMemoryTaxRates {
    rates: RwLock<HashMap<TaxCode, TaxRateRecord>>,
}

impl InMemoryTaxRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, code: TaxCode, record: TaxRateRecord) {
        if let Ok(mut rates) = self.rates.write() {
            rates.insert(code, record);
        }
    }
}

impl TaxRateLookup for InMemoryTaxRates {
    fn rate(&self, code: &TaxCode) -> Option<TaxRateRecord> {
        self.rates.read().ok()?.get(code).copied()
    }
}
