//! Token-bucket rate limiting for the control surface.
//!
//! One bucket guards connection admission for the whole server; each
//! control connection gets its own bucket for commands.

use std::time::Duration;

use tokio::time::Instant;

/// A token bucket refilled lazily from elapsed time.
///
/// There is no background timer: every call first credits
/// `elapsed * rate` tokens (capped at capacity), then answers.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: f64,
    tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// A full bucket holding `max_tokens`, refilled at `refill_per_sec`.
    ///
    /// A non-positive or non-finite rate means the bucket never refills.
    pub fn new(max_tokens: u32, refill_per_sec: f64) -> Self {
        let rate = if refill_per_sec.is_finite() && refill_per_sec > 0.0 {
            refill_per_sec
        } else {
            0.0
        };
        Self {
            capacity: f64::from(max_tokens),
            tokens: f64::from(max_tokens),
            rate,
            last_refill: Instant::now(),
        }
    }

    /// Takes `n` tokens if they are available.
    pub fn try_consume(&mut self, n: u32) -> bool {
        self.refill();
        let n = f64::from(n);
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// How long until `n` tokens are available. Zero if they already are.
    ///
    /// Returns `None` when `n` exceeds the capacity or the bucket never
    /// refills.
    pub fn wait_time(&mut self, n: u32) -> Option<Duration> {
        self.refill();
        let n = f64::from(n);
        if n > self.capacity {
            return None;
        }
        if self.tokens >= n {
            return Some(Duration::ZERO);
        }
        if self.rate == 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64((n - self.tokens) / self.rate))
    }

    /// Tokens currently in the bucket.
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_try_consume_exhausts_burst() {
        let mut limiter = RateLimiter::new(5, 1.0);
        for _ in 0..5 {
            assert!(limiter.try_consume(1));
        }
        assert!(!limiter.try_consume(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_consume_refills_after_one_over_rate() {
        let mut limiter = RateLimiter::new(5, 2.0);
        while limiter.try_consume(1) {}

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(!limiter.try_consume(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.try_consume(1));
        assert!(!limiter.try_consume(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_caps_at_capacity() {
        let mut limiter = RateLimiter::new(3, 10.0);
        assert!(limiter.try_consume(3));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available(), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_consume_multiple_tokens() {
        let mut limiter = RateLimiter::new(4, 1.0);
        assert!(limiter.try_consume(3));
        assert!(!limiter.try_consume(2));
        assert!(limiter.try_consume(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time() {
        let mut limiter = RateLimiter::new(2, 1.0);
        assert_eq!(limiter.wait_time(1), Some(Duration::ZERO));

        assert!(limiter.try_consume(2));
        assert_eq!(limiter.wait_time(1), Some(Duration::from_secs(1)));
        assert_eq!(limiter.wait_time(2), Some(Duration::from_secs(2)));
        assert_eq!(limiter.wait_time(2).map(|d| d.as_millis()), Some(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time_beyond_capacity_is_none() {
        let mut limiter = RateLimiter::new(2, 1.0);
        assert_eq!(limiter.wait_time(3), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_never_refills() {
        let mut limiter = RateLimiter::new(1, 0.0);
        assert!(limiter.try_consume(1));

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!limiter.try_consume(1));
        assert_eq!(limiter.wait_time(1), None);
    }
}
