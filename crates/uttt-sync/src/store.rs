//! # Remote Store
//!
//! The shared key-value store online games are played through. The store
//! itself is an external service; this module defines the contract the
//! coordinator consumes and an in-process implementation of it.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          RemoteStore                                    │
//! │                                                                         │
//! │  write(path, value)   Full overwrite. Last write wins.                 │
//! │  read(path)           Current value, or None if absent.                │
//! │  subscribe(path)      Subscription that yields:                        │
//! │                         1. the current value, immediately              │
//! │                         2. every later value, in commit order          │
//! │                                                                         │
//! │  Dropping a Subscription (or calling unsubscribe) ends it.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## MemoryStore Delivery
//! ```text
//!  Coordinator A            MemoryStore              Coordinator B
//!       │  write(state, S1)      │                          │
//!       │───────────────────────►│── S1 ───────────────────►│
//!       │◄─────────────── S1 ────│   (A's own echo too)     │
//!       │                        │◄──── write(state, S2) ───│
//!       │◄─────────────── S2 ────│── S2 ───────────────────►│
//! ```
//! Writes are serialized by one lock, so every subscriber sees the same
//! order.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::SyncResult;

// =============================================================================
// Store Contract
// =============================================================================

/// A shared record store with change notifications.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Overwrites the value at `path`.
    async fn write(&self, path: &str, value: Value) -> SyncResult<()>;

    /// Reads the value at `path`; `None` if nothing was ever written.
    async fn read(&self, path: &str) -> SyncResult<Option<Value>>;

    /// Subscribes to changes of `path`.
    async fn subscribe(&self, path: &str) -> SyncResult<Subscription>;
}

// =============================================================================
// Subscription
// =============================================================================

/// A live change feed for one path.
#[derive(Debug)]
pub struct Subscription {
    path: String,
    rx: mpsc::UnboundedReceiver<Option<Value>>,
}

impl Subscription {
    /// Wraps a receiver fed by a store implementation.
    pub fn new(path: impl Into<String>, rx: mpsc::UnboundedReceiver<Option<Value>>) -> Self {
        Subscription {
            path: path.into(),
            rx,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Waits for the next notification.
    ///
    /// ## Returns
    /// - `Some(Some(value))` for a written value
    /// - `Some(None)` if the path is (still) absent
    /// - `None` once the store has dropped the feed
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.rx.recv().await
    }

    /// Ends the subscription. Equivalent to dropping it.
    pub fn unsubscribe(mut self) {
        self.rx.close();
        debug!(path = %self.path, "Unsubscribed");
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, Value>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Option<Value>>>>,
}

/// In-process [`RemoteStore`].
///
/// Shared by cloning an `Arc<MemoryStore>` into several coordinators; used
/// by tests and by front ends that host both players in one process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `path`.
    pub async fn subscriber_count(&self, path: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .subscribers
            .get(path)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn write(&self, path: &str, value: Value) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.values.insert(path.to_string(), value.clone());

        if let Some(subs) = inner.subscribers.get_mut(path) {
            subs.retain(|tx| tx.send(Some(value.clone())).is_ok());
            trace!(path, subscribers = subs.len(), "Delivered change");
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> SyncResult<Option<Value>> {
        let inner = self.inner.lock().await;
        Ok(inner.values.get(path).cloned())
    }

    async fn subscribe(&self, path: &str) -> SyncResult<Subscription> {
        let mut inner = self.inner.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();

        // The receiver is still alive here, so this send cannot fail.
        let _ = tx.send(inner.values.get(path).cloned());

        inner
            .subscribers
            .entry(path.to_string())
            .or_default()
            .push(tx);
        debug!(path, "Subscribed");
        Ok(Subscription::new(path, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_after_write() {
        let store = MemoryStore::new();
        assert_eq!(store.read("games/A/state").await.unwrap(), None);

        store.write("games/A/state", json!({ "n": 1 })).await.unwrap();
        assert_eq!(
            store.read("games/A/state").await.unwrap(),
            Some(json!({ "n": 1 }))
        );
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_value_first() {
        let store = MemoryStore::new();
        store.write("p", json!(1)).await.unwrap();

        let mut sub = store.subscribe("p").await.unwrap();
        assert_eq!(sub.next().await, Some(Some(json!(1))));
    }

    #[tokio::test]
    async fn test_subscribe_to_absent_path() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("missing").await.unwrap();
        assert_eq!(sub.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_changes_arrive_in_commit_order() {
        let store = MemoryStore::new();
        let mut first = store.subscribe("p").await.unwrap();
        let mut second = store.subscribe("p").await.unwrap();

        for n in 0..5 {
            store.write("p", json!(n)).await.unwrap();
        }

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.next().await, Some(None));
            for n in 0..5 {
                assert_eq!(sub.next().await, Some(Some(json!(n))));
            }
        }
    }

    #[tokio::test]
    async fn test_other_paths_not_delivered() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("a").await.unwrap();
        assert_eq!(sub.next().await, Some(None));

        store.write("b", json!(true)).await.unwrap();
        store.write("a", json!(false)).await.unwrap();
        assert_eq!(sub.next().await, Some(Some(json!(false))));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop_release_feed() {
        let store = MemoryStore::new();
        let explicit = store.subscribe("p").await.unwrap();
        let dropped = store.subscribe("p").await.unwrap();
        assert_eq!(store.subscriber_count("p").await, 2);

        explicit.unsubscribe();
        assert_eq!(store.subscriber_count("p").await, 1);

        drop(dropped);
        assert_eq!(store.subscriber_count("p").await, 0);

        // Writing to a path with only dead subscribers still succeeds.
        store.write("p", json!(1)).await.unwrap();
    }
}
