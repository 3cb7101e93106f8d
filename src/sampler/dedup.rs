/*!
 * Dedup Cache
 * LRU fingerprint cache with a TTL window
 *
 * Capacity bounds memory; the TTL bounds staleness. Eviction by either
 * mechanism means the next identical fingerprint is admitted again.
 */

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

pub struct DedupCache {
    inner: Mutex<LruCache<u64, Instant>>,
    window: Duration,
}

impl DedupCache {
    /// `capacity` is validated non-zero by config before construction.
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            window,
        }
    }

    /// Returns true if `fingerprint` was already seen within the window.
    /// A miss (or an expired hit) records the fingerprint as seen now.
    pub fn check_and_update(&self, fingerprint: u64, now: Instant) -> bool {
        let mut cache = self.inner.lock();
        if let Some(seen) = cache.get(&fingerprint) {
            if now.duration_since(*seen) < self.window {
                return true;
            }
        }
        cache.put(fingerprint, now);
        false
    }

    /// Evict entries older than the window. Runs on the sweep cadence so
    /// expired fingerprints do not pin cache capacity.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut cache = self.inner.lock();
        let expired: Vec<u64> = cache
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= self.window)
            .map(|(fp, _)| *fp)
            .collect();
        for fp in &expired {
            cache.pop(fp);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sight_not_duplicate() {
        let cache = DedupCache::new(16, Duration::from_secs(300));
        let now = Instant::now();
        assert!(!cache.check_and_update(42, now));
        assert!(cache.check_and_update(42, now));
    }

    #[test]
    fn test_expired_entry_readmitted() {
        let cache = DedupCache::new(16, Duration::from_secs(300));
        let t0 = Instant::now();
        assert!(!cache.check_and_update(42, t0));
        let t1 = t0 + Duration::from_secs(301);
        assert!(!cache.check_and_update(42, t1));
        // Refreshed at t1, so it dedups again
        assert!(cache.check_and_update(42, t1));
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let cache = DedupCache::new(2, Duration::from_secs(300));
        let now = Instant::now();
        cache.check_and_update(1, now);
        cache.check_and_update(2, now);
        cache.check_and_update(3, now);
        // 1 was evicted by capacity, so it is fresh again
        assert!(!cache.check_and_update(1, now));
    }

    #[test]
    fn test_sweep_removes_expired() {
        let cache = DedupCache::new(16, Duration::from_secs(300));
        let t0 = Instant::now();
        cache.check_and_update(1, t0);
        cache.check_and_update(2, t0);
        let t1 = t0 + Duration::from_secs(150);
        cache.check_and_update(3, t1);

        let t2 = t0 + Duration::from_secs(301);
        assert_eq!(cache.sweep(t2), 2);
        assert_eq!(cache.len(), 1);
    }
}
