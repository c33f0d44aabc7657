//! Age and size bounded eviction for fetched-data caches.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A cached value that knows when it was fetched.
pub trait Fetched {
    fn fetched_at(&self) -> Instant;
}

/// Drop entries older than `max_age`, then the oldest entries until at most
/// `max_entries` remain.
pub fn evict_stale<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration)
where
    K: Clone + Eq + Hash,
    V: Fetched,
{
    let now = Instant::now();
    let mut by_age: Vec<(K, Instant)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().fetched_at()))
        .collect();

    by_age.retain(|(key, fetched_at)| {
        let expired = now.duration_since(*fetched_at) > max_age;
        if expired {
            cache.remove(key);
        }
        !expired
    });

    if cache.len() <= max_entries {
        return;
    }

    by_age.sort_by_key(|(_, fetched_at)| *fetched_at);
    let excess = cache.len() - max_entries;
    for (key, _) in by_age.into_iter().take(excess) {
        cache.remove(&key);
    }
}
