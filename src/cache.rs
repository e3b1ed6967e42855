//! Time- and size-bounded memoization for slow external lookups.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::model::{ArtistMetadata, DesiredTrack};

pub const DEFAULT_CACHE_CAPACITY: usize = 500;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedValue<V> {
    value: V,
    inserted_at: Instant,
    generation: u64,
}

struct CacheState<V> {
    entries: HashMap<String, CachedValue<V>>,
    insertion_order: VecDeque<(String, u64)>,
    next_generation: u64,
}

/// Expiring map with least-recently-inserted eviction.
///
/// An entry is served until `ttl` has elapsed since it was inserted. Once more
/// than `capacity` entries are held, the oldest insertion is dropped even if
/// it is still fresh.
pub struct LookupCache<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> LookupCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
                next_generation: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: &str, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached value or runs `fetch`, caching only successful results.
    ///
    /// The lock is released while `fetch` runs, so two callers racing on the
    /// same key may both fetch; the later insertion wins.
    pub fn get_or_fetch<E, F>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState<V>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut state = self.lock_state();
        let expired = match state.entries.get(key) {
            Some(cached) => now.saturating_duration_since(cached.inserted_at) >= self.ttl,
            None => return None,
        };
        if expired {
            state.entries.remove(key);
            return None;
        }
        state.entries.get(key).map(|cached| cached.value.clone())
    }

    fn insert_at(&self, key: &str, value: V, now: Instant) {
        let mut state = self.lock_state();
        let generation = state.next_generation;
        state.next_generation = state.next_generation.wrapping_add(1);
        state.entries.insert(
            key.to_string(),
            CachedValue {
                value,
                inserted_at: now,
                generation,
            },
        );
        state.insertion_order.push_back((key.to_string(), generation));

        while state.entries.len() > self.capacity {
            let Some((oldest_key, oldest_generation)) = state.insertion_order.pop_front() else {
                break;
            };
            let is_live = state
                .entries
                .get(&oldest_key)
                .is_some_and(|cached| cached.generation == oldest_generation);
            if is_live {
                state.entries.remove(&oldest_key);
            }
        }

        // Re-inserted and expired keys leave stale markers behind.
        if state.insertion_order.len() > self.capacity.saturating_mul(2) {
            let CacheState {
                entries,
                insertion_order,
                ..
            } = &mut *state;
            insertion_order.retain(|(key, generation)| {
                entries
                    .get(key)
                    .is_some_and(|cached| cached.generation == *generation)
            });
        }
    }
}

/// The three process-wide lookup caches, built once at startup.
pub struct LookupCaches {
    pub playlist_names: LookupCache<String>,
    pub artists: LookupCache<ArtistMetadata>,
    pub tracks: LookupCache<DesiredTrack>,
}

impl LookupCaches {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            playlist_names: LookupCache::new(capacity, ttl),
            artists: LookupCache::new(capacity, ttl),
            tracks: LookupCache::new(capacity, ttl),
        }
    }
}

impl Default for LookupCaches {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}
