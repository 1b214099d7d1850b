//! Capture service owning the log history and the live subscriber set

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::broadcast::{BroadcastHub, SubscriberId};
use crate::config::CaptureConfig;
use crate::record::TransactionRecord;
use crate::store::LogStore;

/// Process-wide capture state
///
/// Finalization (append + publish) and subscription (snapshot + register)
/// run under the same lock, so a record is either part of a new
/// subscriber's history or delivered to it live, never both and never
/// neither.
#[derive(Debug)]
pub struct CaptureService {
    store: Mutex<LogStore>,
    hub: Arc<BroadcastHub>,
    excluded_prefixes: Vec<String>,
    clear_path: String,
    subscriber_backlog: usize,
    closed: AtomicBool,
}

impl CaptureService {
    /// Create a capture service from configuration
    ///
    /// # Panics
    ///
    /// Panics if `max_logs` is 0 (rejected by `Config::validate`)
    #[must_use]
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            store: Mutex::new(LogStore::new(config.max_logs)),
            hub: Arc::new(BroadcastHub::new()),
            excluded_prefixes: config.excluded_prefixes.clone(),
            clear_path: config.clear_path.clone(),
            subscriber_backlog: config.subscriber_backlog.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, LogStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether requests to `path` produce records
    #[must_use]
    pub fn is_loggable(&self, path: &str) -> bool {
        if path == self.clear_path {
            return false;
        }
        !self
            .excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Append a finalized record and publish it to live subscribers
    pub fn record(&self, record: TransactionRecord) -> Arc<TransactionRecord> {
        let record = Arc::new(record);

        let mut store = self.lock_store();
        store.append(Arc::clone(&record));
        let delivered = self.hub.publish(&record);
        drop(store);

        debug!(
            "Captured {} {} -> {} ({} ms, {} subscribers)",
            record.request.method,
            record.request.path,
            record.response.status,
            record.duration_ms,
            delivered
        );

        record
    }

    /// Register a new subscriber with the current history queued ahead
    ///
    /// Returns `None` once the service has been shut down.
    #[must_use]
    pub fn subscribe(&self) -> Option<Subscription> {
        let store = self.lock_store();
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let history = store.snapshot();
        let (sender, receiver) = mpsc::channel(store.capacity() + self.subscriber_backlog);
        for record in &history {
            // Capacity covers a full store, so this cannot fail
            let _ = sender.try_send(Arc::clone(record));
        }
        let id = self.hub.subscribe(sender);
        drop(store);

        Some(Subscription {
            id,
            history_len: history.len(),
            receiver,
            hub: Arc::clone(&self.hub),
        })
    }

    /// Point-in-time copy of the history, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<TransactionRecord>> {
        self.lock_store().snapshot()
    }

    /// Empty the history; connected subscribers keep what they already got
    pub fn clear(&self) {
        let mut store = self.lock_store();
        let cleared = store.len();
        store.clear();
        drop(store);

        info!("Cleared {} captured records", cleared);
    }

    /// Number of records in history
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_store().len()
    }

    /// Whether history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_store().is_empty()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Disconnect every subscriber and refuse new ones
    pub fn shutdown(&self) {
        let _store = self.lock_store();
        self.closed.store(true, Ordering::Release);
        self.hub.close_all();
        info!("Capture service shut down");
    }
}

/// Live membership in the broadcast hub
///
/// Yields the history captured at subscription time, then live records.
/// Dropping it leaves the hub.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    history_len: usize,
    receiver: mpsc::Receiver<Arc<TransactionRecord>>,
    hub: Arc<BroadcastHub>,
}

impl Subscription {
    /// Subscriber identity
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Number of history records queued at subscription time
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    /// Next record; `None` once the hub has let go of this subscriber
    pub async fn recv(&mut self) -> Option<Arc<TransactionRecord>> {
        self.receiver.recv().await
    }

    /// Next record if one is already queued
    pub fn try_recv(&mut self) -> Option<Arc<TransactionRecord>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
