use super::TokenBucket;
use std::time::{Duration, Instant};

const EPSILON: f64 = 1e-9;

#[test]
fn test_fresh_bucket_starts_full() {
    let now = Instant::now();
    let bucket = TokenBucket::new(2.0, 5.0, now);
    assert_eq!(bucket.tokens(), 5.0);
    assert_eq!(bucket.rate(), 2.0);
    assert_eq!(bucket.capacity(), 5.0);
}

#[test]
fn test_consume_decrements_by_one() {
    let now = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 3.0, now);

    assert!(bucket.consume(now));
    assert!((bucket.tokens() - 2.0).abs() < EPSILON);
    assert!(bucket.consume(now));
    assert!((bucket.tokens() - 1.0).abs() < EPSILON);
}

#[test]
fn test_consume_fails_past_capacity_in_zero_elapsed_window() {
    let now = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 3.0, now);

    for i in 0..3 {
        assert!(bucket.consume(now), "consume {} should succeed", i + 1);
    }
    // 4th call in the same instant has nothing left
    assert!(!bucket.consume(now));
    assert!(bucket.tokens().abs() < EPSILON);
}

#[test]
fn test_failed_consume_leaves_tokens_unchanged() {
    let now = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 1.0, now);

    assert!(bucket.consume(now));
    let before = bucket.tokens();
    assert!(!bucket.consume(now));
    assert_eq!(bucket.tokens(), before);
}

#[test]
fn test_refill_is_monotonic_and_capped() {
    let start = Instant::now();
    let mut bucket = TokenBucket::new(2.0, 10.0, start);

    // Drain completely
    for _ in 0..10 {
        assert!(bucket.consume(start));
    }

    // 3 seconds at 2 tokens/sec
    bucket.refresh(start + Duration::from_secs(3));
    assert!((bucket.tokens() - 6.0).abs() < EPSILON);

    // A long wait caps at capacity
    bucket.refresh(start + Duration::from_secs(3600));
    assert_eq!(bucket.tokens(), 10.0);
}

#[test]
fn test_fractional_rate_accumulates() {
    // rate below one token per second is the case floored refill breaks
    let start = Instant::now();
    let mut bucket = TokenBucket::new(0.5, 1.0, start);

    assert!(bucket.consume(start));
    assert!(!bucket.consume(start + Duration::from_secs(1)));

    let mut after_one_sec = bucket.clone();
    after_one_sec.refresh(start + Duration::from_secs(1));
    assert!((after_one_sec.tokens() - 0.5).abs() < EPSILON);

    assert!(bucket.consume(start + Duration::from_secs(2)));
}

#[test]
fn test_time_until_next_token_zero_when_available() {
    let now = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 2.0, now);
    assert_eq!(bucket.time_until_next_token(now), Duration::ZERO);
}

#[test]
fn test_time_until_next_token_counts_down_from_empty() {
    let start = Instant::now();
    let mut bucket = TokenBucket::new(2.0, 1.0, start);
    assert!(bucket.consume(start));

    // Empty: a whole token is 1/rate = 500ms away
    let hint = bucket.time_until_next_token(start);
    assert!((hint.as_secs_f64() - 0.5).abs() < 1e-6);

    // 200ms later the hint has shrunk by 200ms
    let hint = bucket.time_until_next_token(start + Duration::from_millis(200));
    assert!((hint.as_secs_f64() - 0.3).abs() < 1e-6);

    // At 1/rate elapsed the token is there
    let at_refill = start + Duration::from_millis(500);
    assert_eq!(bucket.time_until_next_token(at_refill), Duration::ZERO);
    assert!(bucket.consume(at_refill));
}

#[test]
fn test_set_rate_reprices_future_not_past() {
    let start = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 10.0, start);
    for _ in 0..10 {
        assert!(bucket.consume(start));
    }

    // 2 seconds at the old rate are banked before the new rate applies
    bucket.set_rate(5.0, start + Duration::from_secs(2));
    bucket.refresh(start + Duration::from_secs(3));
    assert!((bucket.tokens() - 7.0).abs() < EPSILON);
}

#[test]
fn test_set_capacity_caps_stored_tokens() {
    let now = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 10.0, now);
    assert_eq!(bucket.tokens(), 10.0);

    bucket.set_capacity(3.0, now);
    assert_eq!(bucket.tokens(), 3.0);
    assert_eq!(bucket.capacity(), 3.0);
}

#[test]
fn test_set_capacity_growth_requires_refill_time() {
    let start = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 1.0, start);
    assert!(bucket.consume(start));

    // Growing capacity does not mint tokens
    bucket.set_capacity(5.0, start);
    assert!(bucket.tokens().abs() < EPSILON);

    bucket.refresh(start + Duration::from_secs(2));
    assert!((bucket.tokens() - 2.0).abs() < EPSILON);
}

#[test]
fn test_last_used_tracks_successful_consumes_only() {
    let start = Instant::now();
    let mut bucket = TokenBucket::new(1.0, 1.0, start);

    let used_at = start + Duration::from_secs(1);
    assert!(bucket.consume(used_at));
    assert_eq!(bucket.last_used(), used_at);

    // A failed consume later does not refresh last_used
    assert!(!bucket.consume(used_at + Duration::from_millis(100)));
    assert_eq!(bucket.last_used(), used_at);
}
