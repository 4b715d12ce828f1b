//! TTL result cache for read-only queries.
//!
//! Keys are derived by hashing the request (backend id, query, parameters),
//! so two textually identical reads against different backends never collide.
//! Entries expire after their TTL and a background sweeper reclaims them; a
//! hard entry cap bounds memory, evicting the oldest entry when full.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::engine::config::CacheConfig;
use crate::engine::types::{QueryRequest, QueryResult};

struct CacheEntry {
    value: QueryResult,
    created_at: Instant,
    expires_at: Instant,
}

/// Hit/miss counters, monotonically increasing over the cache's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// In-memory result cache with per-entry TTLs.
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Derives the cache key for a request.
///
/// The key covers backend id, query, and parameters. Execution options are
/// deliberately excluded: a dry run never reaches the cache, and deadline
/// overrides do not change what the query returns.
pub fn cache_key(request: &QueryRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.backend_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(
        serde_json::to_vec(&request.query)
            .unwrap_or_default(),
    );
    hasher.update(b"\0");
    hasher.update(
        serde_json::to_vec(&request.params)
            .unwrap_or_default(),
    );
    format!("{:x}", hasher.finalize())
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up an unexpired entry. Expired entries are treated as absent but
    /// left for the sweeper.
    pub fn get(&self, key: &str) -> Option<QueryResult> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key, "cache hit");
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a result under `key`. `ttl_secs` of `None` means the configured
    /// default TTL.
    pub fn insert(&self, key: String, value: QueryResult, ttl_secs: Option<u64>) {
        let ttl = Duration::from_secs(ttl_secs.unwrap_or(self.config.ttl_secs));
        if ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let mut entries = self.entries.write();

        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            // At capacity: make room by dropping the oldest entry.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Removes expired entries. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(dropped, remaining = entries.len(), "swept expired cache entries");
        }
        dropped
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Spawns the background sweeper. The returned handle must be aborted by
    /// the owner on shutdown; the task holds only a weak-equivalent `Arc` and
    /// runs until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        })
    }
}
