// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Bounded reply cache with TTL
//!
//! Maps a normalized (lower-cased, sanitized) first-turn query to a previously
//! generated reply so repeated simple questions skip the upstream call.
//!
//! Eviction is by insertion order: when the cache is full, the entry that was
//! inserted earliest is dropped, regardless of how recently it was read. This
//! is a FIFO cap, not a true LRU; reads do not refresh an entry's age or
//! position. Expiry is strict TTL, checked lazily on read.
//!
//! Only first-turn queries are cached; the key does not encode conversation
//! history, so any request carrying history bypasses the cache entirely.

use indexmap::IndexMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Maximum number of cached replies.
pub const MAX_ENTRIES: usize = 50;

/// Age after which a cached reply is treated as absent.
pub const TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    reply: String,
    stored_at: Instant,
}

/// Insertion-order-bounded, time-expiring reply store.
///
/// Shared by every concurrent request; the evict-then-insert sequence must
/// stay atomic, so it runs under a mutex.
pub struct ReplyCache {
    entries: Mutex<IndexMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ReplyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyCache {
    /// Create a cache with the default capacity and TTL.
    pub fn new() -> Self {
        Self::with_limits(MAX_ENTRIES, TTL)
    }

    /// Create a cache with explicit bounds. Exposed for tests and future
    /// tuning; production code uses [`ReplyCache::new`].
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity,
            ttl,
        }
    }

    /// Look up a reply. Expired entries are removed and reported absent.
    /// A hit does not refresh the entry's age or insertion position.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();

        let expired = entries.get(key).map(|e| e.stored_at.elapsed() > self.ttl);
        match expired {
            Some(true) => {
                entries.shift_remove(key);
                None
            }
            Some(false) => entries.get(key).map(|e| e.reply.clone()),
            None => None,
        }
    }

    /// Store a reply, evicting the earliest-inserted entry when at capacity.
    pub fn set(&self, key: impl Into<String>, reply: impl Into<String>) {
        let mut entries = self.lock();

        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }

        entries.insert(
            key.into(),
            CacheEntry {
                reply: reply.into(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Current number of entries, expired ones included until a read evicts
    /// them.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn get_returns_stored_reply() {
        let cache = ReplyCache::new();
        cache.set("what do you do", "I build things.");
        assert_eq!(cache.get("what do you do").as_deref(), Some("I build things."));
    }

    #[test]
    fn absent_key_is_a_miss() {
        let cache = ReplyCache::new();
        assert_eq!(cache.get("nothing here"), None);
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let cache = ReplyCache::with_limits(MAX_ENTRIES, Duration::from_millis(30));
        cache.set("q", "stale answer");
        sleep(Duration::from_millis(50));

        assert_eq!(cache.get("q"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn full_cache_evicts_earliest_inserted() {
        let cache = ReplyCache::with_limits(2, TTL);
        cache.set("a", "1");
        cache.set("b", "2");
        cache.set("c", "3");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reads_do_not_change_eviction_order() {
        let cache = ReplyCache::with_limits(2, TTL);
        cache.set("a", "1");
        cache.set("b", "2");

        // Reading "a" would protect it under true LRU; here it must not
        assert!(cache.get("a").is_some());
        cache.set("c", "3");

        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn overwriting_a_key_keeps_its_position() {
        let cache = ReplyCache::with_limits(3, TTL);
        cache.set("a", "1");
        cache.set("b", "2");
        cache.set("a", "updated");

        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        assert_eq!(cache.len(), 2);
    }
}
