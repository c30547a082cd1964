//! Idle bucket reaper
//!
//! A background task that periodically sweeps the registry and evicts
//! buckets unused longer than the configured threshold. Eviction only
//! inspects `last_used`: a locked-but-idle bucket is evicted, lease and
//! all, and a later reference silently recreates it with default
//! parameters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokenbucket::BucketRegistry;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Background sweep over the bucket registry.
pub struct Reaper {
    registry: Arc<BucketRegistry>,
    interval: Duration,
    threshold: Duration,
}

impl Reaper {
    pub fn new(registry: Arc<BucketRegistry>, interval: Duration, threshold: Duration) -> Self {
        Reaper {
            registry,
            interval,
            threshold,
        }
    }

    /// Start the sweep loop. It ticks every `interval` until a message
    /// arrives on `shutdown`.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; the first sweep should wait a full period
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.sweep(Instant::now()),
                    _ = shutdown.recv() => break,
                }
            }

            debug!("Reaper shutting down");
        })
    }

    /// One pass over the registry. Holds only the per-entry and map locks
    /// momentarily, never the whole map across the sweep, so foreground
    /// command processing is not stalled.
    fn sweep(&self, now: Instant) {
        for name in self.registry.names() {
            if self.registry.remove_if_idle(&name, self.threshold, now) {
                info!("Removing bucket {} from memory", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_evicts_only_stale_entries() {
        let registry = Arc::new(BucketRegistry::builder().build());
        let start = Instant::now();
        registry.get_or_create("fresh", start).unwrap();
        registry.get_or_create("stale", start).unwrap();

        // "fresh" consumed recently, "stale" untouched
        let later = start + Duration::from_secs(200);
        let fresh = registry.get_or_create("fresh", later).unwrap();
        assert!(fresh.lock_state().bucket.consume(later));

        let reaper = Reaper::new(
            Arc::clone(&registry),
            Duration::from_secs(60),
            Duration::from_secs(300),
        );
        reaper.sweep(start + Duration::from_secs(301));

        assert_eq!(registry.names(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_spawn_exits_on_shutdown() {
        let registry = Arc::new(BucketRegistry::builder().build());
        let reaper = Reaper::new(
            registry,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = reaper.spawn(rx);
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
