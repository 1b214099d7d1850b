//! Bounded pool of connection permits

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of connections served at once
///
/// Event stream subscribers hold their permit for as long as they stay
/// connected, so the cap also bounds the number of subscribers.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    max_connections: usize,
}

impl ConnectionPool {
    /// Create a pool allowing `max_connections` concurrent connections
    ///
    /// # Panics
    ///
    /// Panics if `max_connections` is 0
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        assert!(max_connections > 0, "max_connections must be > 0");

        Self {
            permits: Arc::new(Semaphore::new(max_connections)),
            active: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    /// Claim a permit without waiting
    ///
    /// Returns `None` when the pool is exhausted; the caller drops the
    /// connection.
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        self.active.fetch_add(1, Ordering::Relaxed);

        Some(ConnectionGuard {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Connections currently being served
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Configured cap
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Releases its permit on drop
#[derive(Debug)]
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_limits_connections() {
        let pool = ConnectionPool::new(2);

        let first = pool.try_acquire();
        let second = pool.try_acquire();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(pool.active_connections(), 2);

        assert!(pool.try_acquire().is_none());
    }

    #[test]
    fn test_guard_releases_permit() {
        let pool = ConnectionPool::new(1);

        {
            let _guard = pool.try_acquire().unwrap();
            assert_eq!(pool.active_connections(), 1);
        }

        assert_eq!(pool.active_connections(), 0);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    #[should_panic(expected = "max_connections must be > 0")]
    fn test_zero_connections_panic() {
        let _ = ConnectionPool::new(0);
    }
}
