//! Subscriber registry and record fan-out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::record::TransactionRecord;

/// Identity of one live subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Sending half held for every subscriber
pub type RecordSender = mpsc::Sender<Arc<TransactionRecord>>;

/// Live subscriber set
///
/// Publishing never waits on a subscriber: each one owns a bounded channel
/// drained by its own connection task. A closed or full channel counts as a
/// disconnect.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    subscribers: DashMap<SubscriberId, RecordSender>,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber
    pub fn subscribe(&self, sender: RecordSender) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.insert(id, sender);
        debug!("{} joined ({} live)", id, self.subscribers.len());
        id
    }

    /// Remove a subscriber; returns whether it was still registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!("{} left ({} live)", id, self.subscribers.len());
        }
        removed
    }

    /// Deliver a record to every live subscriber
    ///
    /// Returns the number of subscribers that accepted it. Subscribers whose
    /// delivery failed are removed once the pass is over.
    pub fn publish(&self, record: &Arc<TransactionRecord>) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(Arc::clone(record)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("{} fell behind, dropping", entry.key());
                    failed.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("{} disconnected", entry.key());
                    failed.push(*entry.key());
                }
            }
        }

        for id in failed {
            if self.unsubscribe(id) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    /// Drop every subscriber, ending their streams
    pub fn close_all(&self) {
        let count = self.subscribers.len();
        self.subscribers.clear();
        debug!("Closed {} subscribers", count);
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether a subscriber is still registered
    #[must_use]
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Records published since creation
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Subscribers removed because delivery failed
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
