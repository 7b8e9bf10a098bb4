//! Backend client cache
//!
//! Keeps constructed backend clients keyed by a credential fingerprint so that
//! tenants sharing credentials reuse one connection. The cache is bounded:
//! once `capacity` clients are held, the least recently used one is evicted.
//! An optional TTL forces clients to be rebuilt periodically (for example
//! after a token rotation).

use super::backend::SecretBackend;
use crate::observability::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Default number of clients kept
pub const DEFAULT_CLIENT_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct CacheEntry {
    client: Arc<dyn SecretBackend>,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Monotonic use counter for LRU ordering
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_least_recently_used(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            debug!(fingerprint = %short(&key), "Evicting least recently used backend client");
            self.entries.remove(&key);
        }
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

/// Bounded LRU cache of backend clients
#[derive(Debug, Clone)]
pub struct BackendClientCache {
    inner: Arc<RwLock<CacheState>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl BackendClientCache {
    /// Create a cache holding at most `capacity` clients (minimum 1)
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self { inner: Arc::new(RwLock::new(CacheState::default())), capacity: capacity.max(1), ttl }
    }

    /// Get a cached client if present and not expired
    pub async fn get(&self, fingerprint: &str) -> Option<Arc<dyn SecretBackend>> {
        let mut state = self.inner.write().await;
        let tick = state.next_tick();

        let fresh = state.entries.get(fingerprint).map(|entry| self.is_fresh(entry));

        match fresh {
            Some(true) => {
                let entry = state.entries.get_mut(fingerprint)?;
                entry.last_used = tick;
                metrics::record_client_cache_lookup(true);
                Some(Arc::clone(&entry.client))
            }
            Some(false) => {
                debug!(fingerprint = %short(fingerprint), "Backend client expired");
                state.entries.remove(fingerprint);
                metrics::record_client_cache_lookup(false);
                None
            }
            None => {
                metrics::record_client_cache_lookup(false);
                None
            }
        }
    }

    /// Insert a client, evicting the least recently used one when full
    pub async fn insert(&self, fingerprint: String, client: Arc<dyn SecretBackend>) {
        let mut state = self.inner.write().await;
        let tick = state.next_tick();

        if !state.entries.contains_key(&fingerprint) && state.entries.len() >= self.capacity {
            state.evict_least_recently_used();
        }

        debug!(
            fingerprint = %short(&fingerprint),
            provider = %client.backend_type(),
            "Caching backend client"
        );
        state
            .entries
            .insert(
                fingerprint,
                CacheEntry { client, inserted_at: Instant::now(), last_used: tick },
            );
    }

    /// Drop a client, e.g. after its credentials were revoked
    pub async fn invalidate(&self, fingerprint: &str) {
        self.inner.write().await.entries.remove(fingerprint);
    }

    pub async fn clear(&self) {
        self.inner.write().await.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.ttl.map_or(true, |ttl| entry.inserted_at.elapsed() < ttl)
    }
}

impl Default for BackendClientCache {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_CACHE_CAPACITY, None)
    }
}
