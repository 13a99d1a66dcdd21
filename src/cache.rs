//! # Response Cache
//!
//! Time-boxed memoization of rendered report payloads, one slot per endpoint,
//! shared by every poller.
//!
//! ## Freshness Rules
//!
//! - A slot is served verbatim until its TTL elapses.
//! - In adaptive mode a slot computed during a different run phase is never
//!   served: a phase change forces recomputation immediately.
//! - In adaptive mode a computation that takes longer than the slot's TTL
//!   doubles that slot's TTL (capped), so a slow report is not recomputed
//!   back to back under heavy polling.
//! - [`ResponseCache::invalidate_all`] drops every slot and restores base
//!   TTLs. Computations already in flight when it runs do not store their
//!   result.
//!
//! Computation happens outside the lock. Two callers racing past an expired
//! slot may both compute; each slot is replaced whole under the lock, so a
//! reader never sees a partially written entry.

use crate::runner::RunState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// TTL policy for a [`ResponseCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// TTL every slot starts with
    pub base_ttl: Duration,
    /// Recompute on phase change and grow TTL for slow computations
    pub adaptive: bool,
    /// Upper bound for TTL growth
    pub max_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            base_ttl: crate::defaults::CACHE_TIMEOUT,
            adaptive: true,
            max_ttl: crate::defaults::MAX_CACHE_TIMEOUT,
        }
    }
}

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub phase_refreshes: AtomicU64,
    pub invalidations: AtomicU64,
}

/// Cached payload with metadata
struct CacheEntry<V> {
    payload: V,
    computed_at: Instant,
    ttl: Duration,
    phase: RunState,
}

struct Slots<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    generation: u64,
}

/// Endpoint-keyed payload cache with an adaptive TTL
pub struct ResponseCache<K, V> {
    policy: CachePolicy,
    slots: Mutex<Slots<K, V>>,
    stats: CacheStats,
}

impl<K, V> ResponseCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                generation: 0,
            }),
            stats: CacheStats::default(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Return the cached payload for `key` or compute and store a fresh one
    pub fn get_or_compute<E, F>(&self, key: K, phase: RunState, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_compute_at(key, phase, Instant::now(), compute)
    }

    /// Same as [`get_or_compute`](Self::get_or_compute) with an explicit
    /// request time, against which TTL expiry is judged
    pub fn get_or_compute_at<E, F>(
        &self,
        key: K,
        phase: RunState,
        now: Instant,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let (prior_ttl, generation) = {
            let slots = self.slots.lock();
            let prior_ttl = match slots.entries.get(&key) {
                Some(entry) => {
                    let fresh = now.saturating_duration_since(entry.computed_at) < entry.ttl;
                    let same_phase = !self.policy.adaptive || entry.phase == phase;
                    if fresh && same_phase {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        debug!("Cache hit for {:?}", key);
                        return Ok(entry.payload.clone());
                    }
                    if fresh {
                        self.stats.phase_refreshes.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "Run phase changed {} -> {}, refreshing {:?}",
                            entry.phase, phase, key
                        );
                    }
                    Some(entry.ttl)
                }
                None => None,
            };
            (prior_ttl, slots.generation)
        };

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let payload = compute()?;
        let took = started.elapsed();

        let mut ttl = prior_ttl.unwrap_or(self.policy.base_ttl);
        if self.policy.adaptive && took > ttl {
            let grown = ttl.saturating_mul(2).min(self.policy.max_ttl);
            debug!(
                "Computing {:?} took {:?}, growing TTL {:?} -> {:?}",
                key, took, ttl, grown
            );
            ttl = grown;
        }

        let mut slots = self.slots.lock();
        if slots.generation == generation {
            slots.entries.insert(
                key,
                CacheEntry {
                    payload: payload.clone(),
                    computed_at: now,
                    ttl,
                    phase,
                },
            );
        } else {
            debug!("Cache invalidated during computation of {:?}, not storing", key);
        }
        Ok(payload)
    }

    /// Drop every slot
    pub fn invalidate_all(&self) {
        let mut slots = self.slots.lock();
        slots.entries.clear();
        slots.generation += 1;
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!("Response cache cleared");
    }

    /// Current TTL of a slot, if it holds a payload
    pub fn ttl(&self, key: &K) -> Option<Duration> {
        self.slots.lock().entries.get(key).map(|e| e.ttl)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::sync::Arc;

    fn policy(adaptive: bool) -> CachePolicy {
        CachePolicy {
            base_ttl: Duration::from_secs(2),
            adaptive,
            max_ttl: Duration::from_secs(30),
        }
    }

    fn counting(calls: &Cell<u32>) -> impl FnOnce() -> Result<u32, Infallible> + '_ {
        move || {
            calls.set(calls.get() + 1);
            Ok(calls.get())
        }
    }

    #[test]
    fn test_reuses_payload_within_ttl() {
        let cache = ResponseCache::new(policy(true));
        let calls = Cell::new(0);
        let t0 = Instant::now();

        let a = cache.get_or_compute_at("stats", RunState::Running, t0, counting(&calls));
        let b = cache.get_or_compute_at(
            "stats",
            RunState::Running,
            t0 + Duration::from_millis(1500),
            counting(&calls),
        );
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_recomputes_after_ttl() {
        let cache = ResponseCache::new(policy(true));
        let calls = Cell::new(0);
        let t0 = Instant::now();

        cache
            .get_or_compute_at("stats", RunState::Running, t0, counting(&calls))
            .unwrap();
        let later = cache
            .get_or_compute_at(
                "stats",
                RunState::Running,
                t0 + Duration::from_secs(2),
                counting(&calls),
            )
            .unwrap();
        assert_eq!(later, 2);
    }

    #[test]
    fn test_phase_change_forces_refresh() {
        let cache = ResponseCache::new(policy(true));
        let calls = Cell::new(0);
        let t0 = Instant::now();

        cache
            .get_or_compute_at("stats", RunState::Hatching, t0, counting(&calls))
            .unwrap();
        let after = cache
            .get_or_compute_at(
                "stats",
                RunState::Running,
                t0 + Duration::from_millis(10),
                counting(&calls),
            )
            .unwrap();
        assert_eq!(after, 2);
        assert_eq!(cache.stats().phase_refreshes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_phase_change_ignored_without_adaptive_mode() {
        let cache = ResponseCache::new(policy(false));
        let calls = Cell::new(0);
        let t0 = Instant::now();

        cache
            .get_or_compute_at("stats", RunState::Hatching, t0, counting(&calls))
            .unwrap();
        let after = cache
            .get_or_compute_at(
                "stats",
                RunState::Running,
                t0 + Duration::from_millis(10),
                counting(&calls),
            )
            .unwrap();
        assert_eq!(after, 1);
    }

    #[test]
    fn test_slots_are_per_key() {
        let cache = ResponseCache::new(policy(true));
        let calls = Cell::new(0);
        let t0 = Instant::now();

        let a = cache
            .get_or_compute_at("stats", RunState::Running, t0, counting(&calls))
            .unwrap();
        let b = cache
            .get_or_compute_at("other", RunState::Running, t0, counting(&calls))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_all_evicts() {
        let cache = ResponseCache::new(policy(true));
        let calls = Cell::new(0);
        let t0 = Instant::now();

        cache
            .get_or_compute_at("stats", RunState::Running, t0, counting(&calls))
            .unwrap();
        cache.invalidate_all();
        assert!(cache.is_empty());

        let after = cache
            .get_or_compute_at("stats", RunState::Running, t0, counting(&calls))
            .unwrap();
        assert_eq!(after, 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new(policy(true));
        let t0 = Instant::now();

        let failed: Result<u32, &str> =
            cache.get_or_compute_at("stats", RunState::Running, t0, || Err("boom"));
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_slow_computation_grows_ttl() {
        let cache = ResponseCache::new(CachePolicy {
            base_ttl: Duration::from_millis(1),
            adaptive: true,
            max_ttl: Duration::from_millis(3),
        });
        let slow = || -> Result<u32, Infallible> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(7)
        };

        cache.get_or_compute("stats", RunState::Running, slow).unwrap();
        assert_eq!(cache.ttl(&"stats"), Some(Duration::from_millis(2)));

        cache.get_or_compute("stats", RunState::Running, slow).unwrap();
        assert_eq!(cache.ttl(&"stats"), Some(Duration::from_millis(3)));

        cache.invalidate_all();
        assert_eq!(cache.ttl(&"stats"), None);
    }

    #[test]
    fn test_invalidation_during_compute_discards_result() {
        let cache = Arc::new(ResponseCache::new(policy(true)));
        let inner = Arc::clone(&cache);

        let value = cache
            .get_or_compute("stats", RunState::Running, || -> Result<u32, Infallible> {
                inner.invalidate_all();
                Ok(1)
            })
            .unwrap();
        assert_eq!(value, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_pollers_share_slot() {
        let cache = Arc::new(ResponseCache::new(policy(true)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache
                        .get_or_compute("stats", RunState::Running, || {
                            Ok::<_, Infallible>(Arc::new("payload".to_string()))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().as_str(), "payload");
        }
        assert_eq!(cache.len(), 1);
    }
}
