//! Open connection accounting.
//!
//! The driver acquires a [`ConnectionGuard`] for every accepted connection
//! and drops it when the connection task ends. Shutdown waits on
//! [`ConnectionTracker::wait_idle`] until the count reaches zero or the
//! deadline passes.
//!
//! ```rust
//! use hestia_server::connection::ConnectionTracker;
//!
//! let tracker = ConnectionTracker::new();
//! let guard = tracker.acquire();
//! assert_eq!(tracker.active_connections(), 1);
//!
//! drop(guard);
//! assert_eq!(tracker.active_connections(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Counts the connections a driver is currently serving.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. It stays counted until the guard is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every connection is closed.
    ///
    /// Completes immediately if there are no open connections.
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so a release in between is not missed.
            let notified = self.notify.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// An open connection. Dropping it releases the slot in the tracker.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tracker_counts_guards() {
        let tracker = ConnectionTracker::new();
        let first = tracker.acquire();
        let second = tracker.acquire();
        let third = tracker.acquire();
        assert_eq!(tracker.active_connections(), 3);

        drop(first);
        assert_eq!(tracker.active_connections(), 2);
        drop(second);
        drop(third);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_without_connections() {
        let tracker = ConnectionTracker::new();

        tokio::time::timeout(Duration::from_millis(10), tracker.wait_idle())
            .await
            .expect("wait_idle should complete immediately");
    }

    #[tokio::test]
    async fn test_wait_idle_after_release() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.acquire();

        let waiter = tracker.clone();
        let wait_handle = tokio::spawn(async move {
            waiter.wait_idle().await;
        });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(guard);
        });

        tokio::time::timeout(Duration::from_secs(1), wait_handle)
            .await
            .expect("wait should complete")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_wait_idle_blocks_while_open() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.acquire();

        let result = tokio::time::timeout(Duration::from_millis(20), tracker.wait_idle()).await;
        assert!(result.is_err());
    }
}
