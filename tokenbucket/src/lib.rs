//! # tokenbucket
//!
//! Token bucket rate limiting primitives with a bounded, concurrent bucket
//! registry.
//!
//! ## Overview
//!
//! This crate provides the state and algorithms behind a token-bucket
//! admission-control service:
//!
//! - **Lazy refill**: tokens accumulate continuously between calls, with no
//!   background threads and no floored under-refill for fractional rates
//! - **Advisory wait hints**: denied callers get a best-effort estimate of
//!   when the next token will be available
//! - **Bounded registry**: buckets are created on first reference and capped
//!   at a configurable count
//! - **Fine-grained locking**: each bucket entry carries its own mutex, so
//!   unrelated bucket names never contend
//!
//! ## Quick Start
//!
//! ```
//! use tokenbucket::TokenBucket;
//! use std::time::Instant;
//!
//! // 2 tokens/sec, at most 5 tokens held
//! let mut bucket = TokenBucket::new(2.0, 5.0, Instant::now());
//!
//! if bucket.consume(Instant::now()) {
//!     println!("admitted");
//! } else {
//!     let wait = bucket.time_until_next_token(Instant::now());
//!     println!("retry in {:?}", wait);
//! }
//! ```
//!
//! ## Registry
//!
//! ```
//! use tokenbucket::BucketRegistry;
//! use std::time::Instant;
//!
//! let registry = BucketRegistry::builder()
//!     .default_rate(1.0)
//!     .default_capacity(10.0)
//!     .max_buckets(1024)
//!     .build();
//!
//! let entry = registry.get_or_create("api.search", Instant::now()).unwrap();
//! let admitted = entry.lock_state().bucket.consume(Instant::now());
//! # let _ = admitted;
//! ```
//!
//! ## Time Handling
//!
//! Every time-dependent operation takes `now: Instant` as a parameter
//! instead of reading the clock internally, so callers control the timeline
//! and tests are fully deterministic.
//!
//! ## Thread Safety
//!
//! [`TokenBucket`] itself is not thread-safe; [`BucketRegistry`] shares
//! buckets across threads by wrapping each one in a [`BucketEntry`] with its
//! own mutex.
//!
//! ## Features
//!
//! - `ahash` (default): use AHash for the registry's backing map

pub mod core;

pub use core::{
    BucketEntry, BucketRegistry, EntryState, RegistryBuilder, RegistryError, TokenBucket,
};
