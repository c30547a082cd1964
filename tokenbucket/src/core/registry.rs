//! Bounded, concurrent bucket registry
//!
//! Maps bucket names to entries, creating them on first reference. The map
//! itself sits behind one mutex held only for lookup and insert; each entry
//! carries its own mutex guarding the bucket and lock-expiry state, so
//! operations on distinct bucket names never contend.
//!
//! Lock ordering: nothing acquires an entry mutex while holding the map
//! mutex. The reaper path in [`BucketRegistry::remove_if_idle`] is the only
//! place that takes them in entry-then-map order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

use super::RegistryError;
use super::bucket::TokenBucket;

// Defaults match the daemon's CLI defaults
const DEFAULT_RATE: f64 = 1.0;
const DEFAULT_CAPACITY: f64 = 1.0;
const DEFAULT_MAX_BUCKETS: usize = 65535;

/// Mutable state of one registry entry: the bucket plus its lock lease.
///
/// `locked_until` in the past means unlocked: expiry is lazy, checked at
/// the point of use, never cleared by a timer.
#[derive(Debug)]
pub struct EntryState {
    pub bucket: TokenBucket,
    pub locked_until: Option<Instant>,
}

impl EntryState {
    /// Remaining lease time, if the entry is locked as of `now`.
    pub fn lock_remaining(&self, now: Instant) -> Option<Duration> {
        match self.locked_until {
            Some(until) if until > now => Some(until - now),
            _ => None,
        }
    }

    /// `tokens=<t>,rate=<r>,capacity=<c>` from a refreshed snapshot.
    pub fn stats_line(&mut self, now: Instant) -> String {
        self.bucket.refresh(now);
        format!(
            "tokens={},rate={},capacity={}",
            self.bucket.tokens(),
            self.bucket.rate(),
            self.bucket.capacity()
        )
    }
}

/// One registry entry: a token bucket and its lock lease behind a mutex.
///
/// The mutex serializes every read-modify-write on the entry (consume,
/// rate/capacity changes, lock and release, stats reads), so check-and-act
/// sequences like "verify unlocked, then consume, then lock" are a single
/// critical section.
#[derive(Debug)]
pub struct BucketEntry {
    state: Mutex<EntryState>,
}

impl BucketEntry {
    fn new(bucket: TokenBucket) -> Self {
        BucketEntry {
            state: Mutex::new(EntryState {
                bucket,
                locked_until: None,
            }),
        }
    }

    /// Acquire this entry's mutex.
    ///
    /// A poisoned mutex is recovered rather than propagated: the guarded
    /// state is a token count and a timestamp, both valid whatever a
    /// panicking holder was doing.
    pub fn lock_state(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for configuring a [`BucketRegistry`]
///
/// # Example
///
/// ```
/// use tokenbucket::BucketRegistry;
///
/// let registry = BucketRegistry::builder()
///     .default_rate(0.5)
///     .default_capacity(10.0)
///     .max_buckets(4096)
///     .build();
/// ```
pub struct RegistryBuilder {
    default_rate: f64,
    default_capacity: f64,
    max_buckets: usize,
}

impl RegistryBuilder {
    /// Tokens per second for newly created buckets.
    pub fn default_rate(mut self, rate: f64) -> Self {
        self.default_rate = rate;
        self
    }

    /// Maximum tokens held by newly created buckets.
    pub fn default_capacity(mut self, capacity: f64) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Upper bound on the number of live buckets.
    pub fn max_buckets(mut self, max: usize) -> Self {
        self.max_buckets = max;
        self
    }

    pub fn build(self) -> BucketRegistry {
        BucketRegistry {
            entries: Mutex::new(HashMap::new()),
            default_rate: self.default_rate,
            default_capacity: self.default_capacity,
            max_buckets: self.max_buckets,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        RegistryBuilder {
            default_rate: DEFAULT_RATE,
            default_capacity: DEFAULT_CAPACITY,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }
}

/// Concurrent, size-bounded mapping from bucket name to [`BucketEntry`].
///
/// Entries are created on first reference with the registry's default rate
/// and capacity, and removed only by the idle sweep (see
/// [`remove_if_idle`](Self::remove_if_idle)) or process shutdown.
pub struct BucketRegistry {
    entries: Mutex<HashMap<String, Arc<BucketEntry>>>,
    default_rate: f64,
    default_capacity: f64,
    max_buckets: usize,
}

impl BucketRegistry {
    /// Create a registry with the given defaults for new buckets.
    pub fn new(default_rate: f64, default_capacity: f64, max_buckets: usize) -> Self {
        Self::builder()
            .default_rate(default_rate)
            .default_capacity(default_capacity)
            .max_buckets(max_buckets)
            .build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Whether `name` is acceptable as a bucket identifier.
    ///
    /// Non-empty; Unicode letters and digits plus `.`, `-`, `_` and the
    /// ASCII symbol characters. Whitespace and control characters never
    /// pass.
    pub fn name_is_valid(name: &str) -> bool {
        !name.is_empty() && name.chars().all(is_name_char)
    }

    /// Resolve `name` to its entry, creating it on first reference.
    ///
    /// Lookup and insert happen under one map-mutex critical section, so
    /// two sessions racing on the same new name get the same entry and the
    /// size bound cannot be overshot.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidBucketName`] if the name fails validation
    /// - [`RegistryError::TooManyBuckets`] if the name is new and the
    ///   registry is full (existing names still resolve at the bound)
    pub fn get_or_create(
        &self,
        name: &str,
        now: Instant,
    ) -> Result<Arc<BucketEntry>, RegistryError> {
        if !Self::name_is_valid(name) {
            return Err(RegistryError::InvalidBucketName);
        }

        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get(name) {
            return Ok(Arc::clone(entry));
        }
        if entries.len() >= self.max_buckets {
            return Err(RegistryError::TooManyBuckets);
        }

        let bucket = TokenBucket::new(self.default_rate, self.default_capacity, now);
        let entry = Arc::new(BucketEntry::new(bucket));
        entries.insert(name.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Remove `name` if its bucket has been idle longer than `threshold`.
    ///
    /// Used by the reaper. The entry mutex is held across the removal, so
    /// an entry is never destroyed out from under an in-flight operation;
    /// the map mutex is only taken momentarily at either end. Lock state is
    /// deliberately ignored: a locked-but-idle bucket is still evicted.
    ///
    /// Returns `true` if the entry was removed.
    pub fn remove_if_idle(&self, name: &str, threshold: Duration, now: Instant) -> bool {
        let entry = match self.lock_entries().get(name) {
            Some(entry) => Arc::clone(entry),
            None => return false,
        };

        let state = entry.lock_state();
        if now.duration_since(state.bucket.last_used()) <= threshold {
            return false;
        }

        let mut entries = self.lock_entries();
        // The name may have been re-pointed at a fresh entry in between;
        // only remove the one we checked.
        match entries.get(name) {
            Some(current) if Arc::ptr_eq(current, &entry) => {
                entries.remove(name);
                true
            }
            _ => false,
        }
    }

    /// `tokens=<t>,rate=<r>,capacity=<c>` for `name`, resolving the entry
    /// first.
    pub fn stats_line(&self, name: &str, now: Instant) -> Result<String, RegistryError> {
        let entry = self.get_or_create(name, now)?;
        let mut state = entry.lock_state();
        Ok(state.stats_line(now))
    }

    /// All entries as `name=[stats]`, comma-joined, plus the entry count.
    pub fn status_summary(&self, now: Instant) -> (usize, String) {
        let snapshot: Vec<(String, Arc<BucketEntry>)> = self
            .lock_entries()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();

        let summary = snapshot
            .iter()
            .map(|(name, entry)| format!("{}=[{}]", name, entry.lock_state().stats_line(now)))
            .collect::<Vec<_>>()
            .join(",");
        (snapshot.len(), summary)
    }

    /// Snapshot of the current bucket names.
    pub fn names(&self) -> Vec<String> {
        self.lock_entries().keys().cloned().collect()
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Arc<BucketEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '.' | '-' | '_' | '$' | '+' | '<' | '=' | '>' | '^' | '`' | '|' | '~'
        )
}
