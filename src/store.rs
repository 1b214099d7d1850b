//! Bounded in-memory history of transaction records

use std::collections::VecDeque;
use std::sync::Arc;

use static_assertions::const_assert;

use crate::record::TransactionRecord;

/// Default number of records kept in history
pub const MAX_LOGS: usize = 200;

const_assert!(MAX_LOGS > 0);

/// Insertion-ordered ring buffer with FIFO eviction
///
/// Not synchronized on its own; `CaptureService` owns it behind a lock.
#[derive(Debug)]
pub struct LogStore {
    records: VecDeque<Arc<TransactionRecord>>,
    capacity: usize,
    total_appended: u64,
    total_evicted: u64,
}

impl LogStore {
    /// Create a store holding at most `capacity` records
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
            total_evicted: 0,
        }
    }

    /// Append a record, evicting the oldest ones past capacity
    pub fn append(&mut self, record: Arc<TransactionRecord>) {
        self.records.push_back(record);
        self.total_appended += 1;

        while self.records.len() > self.capacity {
            self.records.pop_front();
            self.total_evicted += 1;
        }
    }

    /// Point-in-time copy of the history, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<TransactionRecord>> {
        self.records.iter().cloned().collect()
    }

    /// Iterate over the history, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TransactionRecord>> {
        self.records.iter()
    }

    /// Remove every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records held
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records appended since creation
    #[must_use]
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Records dropped by eviction since creation
    #[must_use]
    pub fn total_evicted(&self) -> u64 {
        self.total_evicted
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(MAX_LOGS)
    }
}
