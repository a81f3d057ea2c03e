use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub items: usize,
    pub hits: u64,
    pub misses: u64,
}

/// TTL response cache keyed by request fingerprint.
///
/// Expired entries are never returned: `get` checks the deadline and evicts
/// lazily; a background sweeper runs every `2 × default_ttl` to bound memory
/// for keys that are never read again.
pub struct Cache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Per-fingerprint refresh locks: at most one cache refresh in flight
    /// per key, late arrivals wait and re-read.
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Cache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inflight: DashMap::new(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => None,
            None => None,
        };

        match hit {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                // Evict lazily, re-checking under the shard lock.
                self.entries
                    .remove_if(key, |_, entry| entry.expires_at <= now);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: serde_json::Value, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn item_count(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            items: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Cached read with single-flight refresh: on a miss, only one caller
    /// computes the value for a given fingerprint; concurrent callers wait
    /// on the per-key lock and then re-read the fresh entry.
    pub async fn get_or_refresh<F, Fut, E>(&self, key: &str, f: F) -> Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let lock = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited on the lock.
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = f().await?;
        self.set(key, value.clone());
        self.inflight.remove(key);
        Ok(value)
    }

    /// Background sweep removing expired entries.
    pub async fn run_sweeper(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self
            .default_ttl
            .saturating_mul(2)
            .max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("cache sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let before = self.entries.len();
                    self.sweep_expired();
                    let after = self.entries.len();
                    if before != after {
                        tracing::debug!(removed = before - after, "cache sweep");
                    }
                }
            }
        }
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}
