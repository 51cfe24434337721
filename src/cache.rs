//! CNAME cache implementation.
//!
//! This module provides an in-memory cache of resolved CNAME targets keyed by
//! the queried hostname. Freshness is checked lazily when an entry is read;
//! nothing sweeps expired entries in the background.

use std::num::NonZeroUsize;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use log::debug;
use lru::LruCache;

/// An entry in the CNAME cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The CNAME target, dot-terminated as received from upstream.
    pub cname: String,

    /// The instant after which the entry must not be served.
    pub expiry: Instant,
}

impl CacheEntry {
    /// Whether the entry may still be served at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expiry
    }
}

/// Cache of CNAME lookups guarded by a reader/writer lock.
///
/// Readers share the lock and never update recency, so with a capacity bound
/// the entry evicted first is the one written longest ago.
#[derive(Debug)]
pub struct CnameCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl CnameCache {
    /// Create a cache.
    ///
    /// # Arguments
    /// * `max_entries` - Optional bound on the number of hosts kept. `None`
    ///   keeps every host until restart.
    ///
    /// # Returns
    /// A new `CnameCache` instance.
    pub fn new(max_entries: Option<NonZeroUsize>) -> Self {
        let entries = match max_entries {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Get the cached CNAME for `host` if it is still fresh at `now`.
    pub fn get(&self, host: &str, now: Instant) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .peek(host)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.cname.clone())
    }

    /// Get the raw entry for `host`, fresh or not.
    pub fn entry(&self, host: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.peek(host).cloned()
    }

    /// Store `cname` for `host`, expiring `ttl` seconds after `now`.
    ///
    /// Any previous entry is replaced, even one that is still fresh and
    /// outlives the new one.
    pub fn insert(&self, host: &str, cname: &str, ttl: u32, now: Instant) {
        let entry = CacheEntry {
            cname: cname.to_string(),
            expiry: now + Duration::from_secs(u64::from(ttl)),
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((evicted, _)) = entries.push(host.to_string(), entry) {
            if evicted != host {
                debug!("Evicted cached CNAME for {}", evicted);
            }
        }
    }

    /// Number of entries held, including expired ones.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
