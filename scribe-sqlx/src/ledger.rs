//! Open-transaction ledger.
//!
//! Every transaction begun through an instrumented source is parked here,
//! tagged with the request that opened it (when one is active). Handles
//! borrow the transaction for the duration of each statement via
//! take/restore; commit and rollback remove the entry for good. Whatever is
//! still present for a request when it ends is a leak, drained and rolled
//! back by the detector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use scribe_intercept::RequestId;

/// One parked transaction.
pub struct LedgerEntry<T> {
    /// The underlying transaction.
    pub txn: T,
    /// Request that opened the transaction, if one was active.
    pub scope: Option<RequestId>,
}

/// Ledger of transactions that are currently open on one source.
pub struct TxnLedger<T> {
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, LedgerEntry<T>>>,
}

impl<T> TxnLedger<T> {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Park a transaction, returning its handle id.
    pub fn insert(&self, txn: T, scope: Option<RequestId>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.open.lock().insert(id, LedgerEntry { txn, scope });
        id
    }

    /// Remove and return the entry for `id`, if still open.
    pub fn take(&self, id: u64) -> Option<LedgerEntry<T>> {
        self.open.lock().remove(&id)
    }

    /// Park a taken transaction again under its original id.
    pub fn restore(&self, id: u64, entry: LedgerEntry<T>) {
        self.open.lock().insert(id, entry);
    }

    /// Whether the entry for `id` is still open.
    pub fn contains(&self, id: u64) -> bool {
        self.open.lock().contains_key(&id)
    }

    /// Remove and return every entry opened by `scope`.
    pub fn drain_scope(&self, scope: RequestId) -> Vec<T> {
        let mut open = self.open.lock();
        let ids: Vec<u64> = open
            .iter()
            .filter(|(_, entry)| entry.scope == Some(scope))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| open.remove(&id))
            .map(|entry| entry.txn)
            .collect()
    }

    /// Number of open entries.
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }
}

impl<T> Default for TxnLedger<T> {
    fn default() -> Self {
        Self::new()
    }
}
