//! In-memory idempotency store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use seatline_core::error::Result;
use seatline_core::store::IdempotencyStore;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// `HashMap`-backed [`IdempotencyStore`] with per-key expiry.
#[derive(Clone, Debug)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl InMemoryIdempotencyStore {
    /// Create a store whose marks expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of live marks.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|expires| **expires > now)
            .count()
    }

    /// Whether no live marks exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_live(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|expires| *expires > Instant::now())
    }

    fn try_mark(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(expires) if *expires > now => false,
            _ => {
                entries.insert(key.to_string(), now + self.ttl);
                true
            }
        }
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn seen<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.is_live(key)) })
    }

    fn mark_seen<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.try_mark(key)) })
    }

    fn forget<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_mark_wins() {
        let store = InMemoryIdempotencyStore::default();
        assert!(store.mark_seen("k-1").await.unwrap());
        assert!(!store.mark_seen("k-1").await.unwrap());
        assert!(store.seen("k-1").await.unwrap());
        assert!(!store.seen("k-2").await.unwrap());
    }

    #[tokio::test]
    async fn forget_allows_a_retry() {
        let store = InMemoryIdempotencyStore::default();
        store.mark_seen("k-1").await.unwrap();
        store.forget("k-1").await.unwrap();
        assert!(store.mark_seen("k-1").await.unwrap());
    }

    #[tokio::test]
    async fn marks_expire() {
        let store = InMemoryIdempotencyStore::new(Duration::from_millis(10));
        store.mark_seen("k-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!store.seen("k-1").await.unwrap());
        assert!(store.is_empty());
        assert!(store.mark_seen("k-1").await.unwrap());
    }
}
