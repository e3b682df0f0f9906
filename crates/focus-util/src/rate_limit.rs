//! Rate limiting utilities

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Token-bucket rate limiter keyed by any hashable identity
/// (IPC client ids, remote command sources).
#[derive(Debug)]
pub struct RateLimiter<K> {
    max_tokens: u32,
    refill_interval: Duration,
    buckets: HashMap<K, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    /// Allow `max_requests` per `interval` for each key
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            buckets: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed, consuming one token
    pub fn check(&mut self, key: &K) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &K, now: Instant) -> bool {
        let bucket = self.buckets.entry(key.clone()).or_insert(Bucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed >= self.refill_interval && !self.refill_interval.is_zero() {
            let intervals = (elapsed.as_millis() / self.refill_interval.as_millis()) as u32;
            bucket.tokens = bucket
                .tokens
                .saturating_add(intervals.saturating_mul(self.max_tokens))
                .min(self.max_tokens);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Forget a key (e.g. when its client disconnects)
    pub fn remove(&mut self, key: &K) {
        self.buckets.remove(key);
    }

    /// Drop buckets that have been idle for `stale_after`
    pub fn cleanup(&mut self, stale_after: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < stale_after);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientId;

    #[test]
    fn allows_within_limit() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let client = ClientId::new();

        for _ in 0..5 {
            assert!(limiter.check(&client));
        }
        assert!(!limiter.check(&client));
    }

    #[test]
    fn keys_have_independent_buckets() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        let a = ClientId::new();
        let b = ClientId::new();

        assert!(limiter.check(&a));
        assert!(limiter.check(&a));
        assert!(!limiter.check(&a));

        assert!(limiter.check(&b));
        assert!(limiter.check(&b));
    }

    #[test]
    fn refills_after_interval() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        let start = Instant::now();

        assert!(limiter.check_at(&"shim", start));
        assert!(!limiter.check_at(&"shim", start));
        assert!(limiter.check_at(&"shim", start + Duration::from_secs(2)));
    }

    #[test]
    fn remove_resets_bucket() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(&"x"));
        assert!(!limiter.check(&"x"));
        limiter.remove(&"x");
        assert!(limiter.check(&"x"));
    }
}
