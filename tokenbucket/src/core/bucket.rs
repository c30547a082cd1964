//! Lazy-refill token bucket
//!
//! Tokens accumulate continuously at `rate` per second up to `capacity`,
//! computed on demand from the elapsed time since the last refill. There is
//! no background timer: every operation that depends on the token count
//! refills first.

use std::time::{Duration, Instant};

/// A single token bucket.
///
/// The token count is a real number: fractional accumulation is what makes
/// rates below one token per second work. Flooring the refill would
/// systematically under-refill those buckets, so the count is never
/// truncated.
///
/// All time-dependent methods take `now` as a parameter; callers own the
/// clock.
///
/// # Example
///
/// ```
/// use tokenbucket::TokenBucket;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let mut bucket = TokenBucket::new(1.0, 2.0, start);
///
/// assert!(bucket.consume(start));
/// assert!(bucket.consume(start));
/// assert!(!bucket.consume(start));
///
/// // One second later a token has accumulated again.
/// assert!(bucket.consume(start + Duration::from_secs(1)));
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Tokens added per second.
    rate: f64,
    /// Maximum tokens the bucket can hold.
    capacity: f64,
    /// Current available tokens, `0 <= tokens <= capacity`.
    tokens: f64,
    /// When the token count was last brought up to date.
    last_refill: Instant,
    /// When a consume last succeeded. Drives idle eviction, nothing else.
    last_used: Instant,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    ///
    /// `rate` and `capacity` must be positive; the registry and the server
    /// configuration validate them before construction.
    pub fn new(rate: f64, capacity: f64, now: Instant) -> Self {
        debug_assert!(rate > 0.0, "rate must be positive");
        debug_assert!(capacity > 0.0, "capacity must be positive");
        TokenBucket {
            rate,
            capacity,
            tokens: capacity,
            last_refill: now,
            last_used: now,
        }
    }

    /// Take one token.
    ///
    /// Returns `true` and records `now` as the last use when a whole token
    /// is available. On `false` the refill is the only state change.
    pub fn consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.last_used = now;
            true
        } else {
            false
        }
    }

    /// Advisory time until a whole token is available.
    ///
    /// Zero when one already is. The estimate assumes the current rate; a
    /// concurrent rate change or a delayed retry can invalidate it, which is
    /// why callers treat it as a backoff hint rather than a reservation.
    pub fn time_until_next_token(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
    }

    /// Replace the refill rate.
    ///
    /// Refills at the old rate first so already-elapsed time is not
    /// re-priced at the new rate.
    pub fn set_rate(&mut self, new_rate: f64, now: Instant) {
        debug_assert!(new_rate > 0.0, "rate must be positive");
        self.refill(now);
        self.rate = new_rate;
    }

    /// Replace the capacity.
    ///
    /// The refill that follows clamps the stored token count, so a reduced
    /// capacity is reflected immediately in every subsequent read.
    pub fn set_capacity(&mut self, new_capacity: f64, now: Instant) {
        debug_assert!(new_capacity > 0.0, "capacity must be positive");
        self.capacity = new_capacity;
        self.refill(now);
    }

    /// Bring the token count up to date without consuming.
    pub fn refresh(&mut self, now: Instant) {
        self.refill(now);
    }

    /// Tokens available as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum tokens held.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// When a consume last succeeded.
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    fn refill(&mut self, now: Instant) {
        // duration_since saturates to zero if now is older than last_refill
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}
