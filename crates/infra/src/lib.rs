//! `postledger-infra` — storage seams, the unit of work, and the posting
//! orchestrator.
//!
//! The domain crates decide; this crate persists. Everything side-effectful
//! funnels through [`store::PostingStore::commit`], which applies one
//! [`unit_of_work::UnitOfWork`] atomically under per-record optimistic
//! version checks. The [`posting::PostingOrchestrator`] drives the whole
//! pipeline and owns the retry loop around those checks.

pub mod cache;
pub mod in_memory;
pub mod lookup;
pub mod posting;
pub mod store;
pub mod unit_of_work;

pub use cache::{InvalidationKey, InvalidationSink, NullSink, RecordingSink};
pub use in_memory::InMemoryStore;
pub use lookup::{InMemoryCatalog, InMemoryTaxRates, ItemCatalog, ItemRecord};
pub use posting::{
    InvoiceRequest, LineRequest, Posted, PostingError, PostingOrchestrator, ReturnRequest,
};
pub use store::{PostingStore, StoreError, Versioned};
pub use unit_of_work::UnitOfWork;
