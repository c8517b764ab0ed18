//! Cache invalidation keys.
//!
//! The store knows nothing about caches. Posting operations collect the keys
//! their writes dirty, and the orchestrator pushes them to an
//! [`InvalidationSink`] strictly after the commit succeeds: an aborted
//! posting must leave caches untouched.

use core::fmt;
use std::sync::{Arc, Mutex};

use postledger_core::TransactionId;

/// A cache key dirtied by a committed posting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationKey {
    Transaction(TransactionId),
    TransactionList,
    LedgerAccount(String),
}

impl fmt::Display for InvalidationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(id) => write!(f, "transaction:{id}"),
            Self::TransactionList => write!(f, "transactions:list"),
            Self::LedgerAccount(code) => write!(f, "ledger:{code}"),
        }
    }
}

/// Receives invalidations after a successful commit.
///
/// Delivery is best-effort: a sink must not fail the posting, so the
/// interface is infallible and implementations swallow their own errors.
pub trait InvalidationSink: Send + Sync {
    fn invalidate(&self, key: &InvalidationKey);
}

impl<K> InvalidationSink for Arc<K>
where
    K: InvalidationSink + ?Sized,
{
    fn invalidate(&self, key: &InvalidationKey) {
        (**self).invalidate(key);
    }
}

/// Sink for wiring without a cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl InvalidationSink for NullSink {
    fn invalidate(&self, _key: &InvalidationKey) {}
}

/// Records every key it receives, in order. Test double.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<InvalidationKey>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<InvalidationKey> {
        self.seen.lock().map(|keys| keys.clone()).unwrap_or_default()
    }
}

impl InvalidationSink for RecordingSink {
    fn invalidate(&self, key: &InvalidationKey) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(key.clone());
        }
    }
}
