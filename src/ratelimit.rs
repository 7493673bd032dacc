//! Token-bucket gate for model calls.
//!
//! One limiter is constructed per process and shared by every agent loop
//! through an `Arc`. The bucket refills all at once: when more than one
//! window has elapsed since the last refill, the token count jumps back to
//! capacity. There is no continuous trickle refill.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::RateLimitConfig;

/// The limiter refused to hand out a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Rate limit exceeded. Please try again later.")]
pub struct RateLimitExceeded;

/// Snapshot of the bucket, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub capacity: u32,
    pub remaining_tokens: u32,
    pub window: Duration,
    pub last_refill: Instant,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Shared token bucket with full refill on window expiry.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter that starts with a full bucket.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self::starting_at(capacity, window, Instant::now())
    }

    /// Create a limiter whose first window starts at `now`.
    pub fn starting_at(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            window,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.window())
    }

    /// Take one token or fail with [`RateLimitExceeded`].
    pub fn acquire(&self) -> Result<(), RateLimitExceeded> {
        self.acquire_at(Instant::now())
    }

    /// Same as [`acquire`](Self::acquire) with an explicit clock reading.
    pub fn acquire_at(&self, now: Instant) -> Result<(), RateLimitExceeded> {
        // A poisoned lock still holds a consistent bucket: every mutation is a
        // plain field store.
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());

        if now.saturating_duration_since(bucket.last_refill) > self.window {
            bucket.tokens = self.capacity;
            bucket.last_refill = now;
            tracing::debug!(capacity = self.capacity, "Rate limit window elapsed, bucket refilled");
        }

        if bucket.tokens == 0 {
            tracing::warn!(
                capacity = self.capacity,
                window_secs = self.window.as_secs(),
                "Rate limit exceeded"
            );
            return Err(RateLimitExceeded);
        }

        bucket.tokens -= 1;
        Ok(())
    }

    pub fn state(&self) -> RateLimitState {
        let bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        RateLimitState {
            capacity: self.capacity,
            remaining_tokens: bucket.tokens,
            window: self.window,
            last_refill: bucket.last_refill,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_full() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let state = limiter.state();
        assert_eq!(state.capacity, 3);
        assert_eq!(state.remaining_tokens, 3);
    }

    #[test]
    fn test_third_call_in_window_is_rejected() {
        let start = Instant::now();
        let limiter = RateLimiter::starting_at(2, Duration::from_secs(60), start);

        assert!(limiter.acquire_at(start).is_ok());
        assert!(limiter.acquire_at(start + Duration::from_millis(300)).is_ok());
        assert_eq!(
            limiter.acquire_at(start + Duration::from_millis(900)),
            Err(RateLimitExceeded)
        );
        assert_eq!(limiter.state().remaining_tokens, 0);
    }

    #[test]
    fn test_full_refill_after_window() {
        let start = Instant::now();
        let limiter = RateLimiter::starting_at(2, Duration::from_secs(60), start);
        limiter.acquire_at(start).unwrap();
        limiter.acquire_at(start).unwrap();
        assert!(limiter.acquire_at(start + Duration::from_secs(30)).is_err());

        let later = start + Duration::from_secs(61);
        assert!(limiter.acquire_at(later).is_ok());
        let state = limiter.state();
        assert_eq!(state.remaining_tokens, 1);
        assert_eq!(state.last_refill, later);
    }

    #[test]
    fn test_no_partial_refill_inside_window() {
        let start = Instant::now();
        let limiter = RateLimiter::starting_at(2, Duration::from_secs(60), start);
        limiter.acquire_at(start).unwrap();

        // Exactly one window is not "more than" one window.
        limiter.acquire_at(start + Duration::from_secs(60)).unwrap();
        assert_eq!(limiter.state().remaining_tokens, 0);
        assert_eq!(limiter.state().last_refill, start);
    }

    #[test]
    fn test_rejection_leaves_state_untouched() {
        let start = Instant::now();
        let limiter = RateLimiter::starting_at(1, Duration::from_secs(60), start);
        limiter.acquire_at(start).unwrap();
        let before = limiter.state();
        assert!(limiter.acquire_at(start + Duration::from_secs(1)).is_err());
        assert_eq!(limiter.state(), before);
    }

    #[test]
    fn test_zero_capacity_always_rejects() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        assert!(limiter.acquire().is_err());
    }

    #[test]
    fn test_concurrent_callers_share_one_bucket() {
        let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(3600)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || (0..5).filter(|_| limiter.acquire().is_ok()).count())
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 10);
        assert_eq!(limiter.state().remaining_tokens, 0);
    }

    #[test]
    fn test_from_config() {
        let limiter = RateLimiter::from_config(&RateLimitConfig {
            capacity: 4,
            window_secs: 5,
        });
        let state = limiter.state();
        assert_eq!(state.capacity, 4);
        assert_eq!(state.window, Duration::from_secs(5));
    }
}
