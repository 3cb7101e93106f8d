/*!
 * Token Bucket
 * Continuous-refill rate limiter for admission ceilings
 *
 * Tokens are fractional so refill is smooth at any call cadence. Capacity
 * equals the per-second rate, bounding bursts to one second's allowance.
 */

use parking_lot::Mutex;
use std::time::Instant;

#[derive(Debug)]
struct Inner {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    inner: Mutex<Inner>,
}

impl TokenBucket {
    /// `rate_per_sec` is validated positive by config before construction.
    pub fn new(rate_per_sec: u32, now: Instant) -> Self {
        let capacity = f64::from(rate_per_sec.max(1));
        Self {
            capacity,
            refill_per_sec: capacity,
            inner: Mutex::new(Inner {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    fn refill(&self, inner: &mut Inner, now: Instant) {
        let elapsed = now.duration_since(inner.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            inner.tokens = (inner.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            inner.last_refill = now;
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        self.refill(&mut inner, now);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Return one token, capped at capacity. Used when a downstream gate
    /// rejects a record this bucket already admitted.
    pub fn refund(&self) {
        let mut inner = self.inner.lock();
        inner.tokens = (inner.tokens + 1.0).min(self.capacity);
    }

    /// Current fill fraction in [0, 1]. Sustained high fill means the
    /// admission pipeline is not using its allowance.
    pub fn fill_fraction(&self, now: Instant) -> f64 {
        let mut inner = self.inner.lock();
        self.refill(&mut inner, now);
        inner.tokens / self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_bounded_by_capacity() {
        let now = Instant::now();
        let bucket = TokenBucket::new(5, now);
        for _ in 0..5 {
            assert!(bucket.try_acquire(now));
        }
        assert!(!bucket.try_acquire(now));
    }

    #[test]
    fn test_refill_over_time() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new(10, t0);
        for _ in 0..10 {
            bucket.try_acquire(t0);
        }
        // 200ms at 10/s refills 2 tokens
        let t1 = t0 + Duration::from_millis(200);
        assert!(bucket.try_acquire(t1));
        assert!(bucket.try_acquire(t1));
        assert!(!bucket.try_acquire(t1));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new(3, t0);
        let t1 = t0 + Duration::from_secs(60);
        assert!((bucket.fill_fraction(t1) - 1.0).abs() < f64::EPSILON);
        for _ in 0..3 {
            assert!(bucket.try_acquire(t1));
        }
        assert!(!bucket.try_acquire(t1));
    }

    #[test]
    fn test_refund_restores_token() {
        let now = Instant::now();
        let bucket = TokenBucket::new(2, now);
        assert!(bucket.try_acquire(now));
        assert!(bucket.try_acquire(now));
        assert!(!bucket.try_acquire(now));
        bucket.refund();
        assert!(bucket.try_acquire(now));
        // A full bucket absorbs refunds without exceeding capacity
        bucket.refund();
        bucket.refund();
        bucket.refund();
        assert!((bucket.fill_fraction(now) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fill_fraction() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new(4, t0);
        assert!((bucket.fill_fraction(t0) - 1.0).abs() < f64::EPSILON);
        bucket.try_acquire(t0);
        bucket.try_acquire(t0);
        assert!((bucket.fill_fraction(t0) - 0.5).abs() < f64::EPSILON);
    }
}
