// crates/server/src/cache.rs
//! Time-bounded result cache.
//!
//! Consulted by consumer routes before any job machinery: a fresh final
//! result short-circuits job creation entirely. Workers write their payload
//! here on success. Entries are evicted lazily on read.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default freshness window for cached computation results.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(10 * 60);

pub struct ResultCache {
    ttl: Duration,
    inner: RwLock<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    stored_at: Instant,
    value: serde_json::Value,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a fresh result, evicting the entry if it has gone stale.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut map = match self.inner.write() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("RwLock poisoned reading result cache: {e}");
                return None;
            }
        };
        match map.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, value: serde_json::Value) {
        match self.inner.write() {
            Ok(mut map) => {
                map.insert(
                    key.to_string(),
                    CacheEntry {
                        stored_at: Instant::now(),
                        value,
                    },
                );
            }
            Err(e) => tracing::error!("RwLock poisoned writing result cache: {e}"),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_TTL)
    }
}
