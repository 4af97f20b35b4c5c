//! Time-boxed memoization for read-only lookups.
//!
//! Entries are keyed by a SHA-256 of `namespace:normalised-input`, store the
//! value with its insertion instant, and are checked against the TTL on read.
//! Instances are owned by whoever needs them and passed explicitly to
//! handlers.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (V, Instant)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stable cache key for `input` within `namespace`.
    pub fn key(namespace: &str, input: &str) -> String {
        hex::encode(Sha256::digest(format!("{namespace}:{input}").as_bytes()))
    }

    /// Fresh value for `key`, if any. Expired entries are dropped on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, inserted)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: V) {
        self.lock().insert(key, (value, Instant::now()));
    }

    /// Return the cached value for `input`, or compute, store and return it.
    ///
    /// The lock is not held across `compute`; two concurrent misses for the
    /// same key both compute and the later insert wins.
    pub async fn get_or_insert_with<F, Fut>(&self, namespace: &str, input: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let key = Self::key(namespace, input);
        if let Some(hit) = self.get(&key) {
            tracing::debug!(namespace, input, "cache hit");
            return hit;
        }
        let value = compute().await;
        self.insert(key, value.clone());
        value
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, inserted)| inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (V, Instant)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
