use super::RateLimitPolicy;
use crate::clock::{Clock, MonotonicClock};
use crate::event::InteractionEvent;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
struct Bucket {
    remaining: u32,
    reset_at: u64,
}

impl Bucket {
    /// Fresh bucket that already accounts for the call creating it.
    fn armed(policy: &RateLimitPolicy, now: u64) -> Self {
        let window = u64::try_from(policy.window().as_millis()).unwrap_or(u64::MAX);
        Self {
            remaining: policy.quota().saturating_sub(1),
            reset_at: now.saturating_add(window),
        }
    }

    fn is_expired(&self, now: u64) -> bool {
        self.reset_at <= now
    }
}

/// Read-only view of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    /// Bucket key (`{scope}:{id}:{path}`).
    pub key: String,
    /// Calls left in the current window.
    pub remaining: u32,
    /// Time left until the bucket resets.
    pub resets_in: Duration,
}

/// In-memory bucket map shared by every dispatch and the purge task.
///
/// Every read and write of a bucket happens under the map's per-key lock, so
/// concurrent callers on one key are serialized and never lose a decrement.
#[derive(Debug)]
pub struct RateLimitRegistry {
    buckets: DashMap<String, Bucket>,
    clock: Arc<dyn Clock>,
}

impl Default for RateLimitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitRegistry {
    /// Registry timed by a monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::default()))
    }

    /// Registry timed by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Consume one call for `event` under `policy`.
    ///
    /// Returns `None` when admitted, or the time left until the bucket resets
    /// when limited.
    pub fn acquire(&self, policy: &RateLimitPolicy, event: &InteractionEvent) -> Option<Duration> {
        self.acquire_key(policy, &policy.key(event))
    }

    /// [`acquire`](Self::acquire) with a precomputed key.
    pub fn acquire_key(&self, policy: &RateLimitPolicy, key: &str) -> Option<Duration> {
        let now = self.clock.now_millis();
        match self.buckets.entry(key.to_owned()) {
            Entry::Vacant(slot) => {
                debug!(target: "slashgate::rate_limit", key, "creating rate-limit bucket");
                slot.insert(Bucket::armed(policy, now));
                None
            }
            Entry::Occupied(mut slot) => {
                let bucket = slot.get_mut();
                if bucket.is_expired(now) {
                    debug!(target: "slashgate::rate_limit", key, "re-arming expired bucket");
                    *bucket = Bucket::armed(policy, now);
                    return None;
                }
                if bucket.remaining == 0 {
                    return Some(Duration::from_millis(bucket.reset_at - now));
                }
                bucket.remaining -= 1;
                None
            }
        }
    }

    /// Remove every bucket whose reset time has passed; returns how many went.
    ///
    /// Each bucket is checked and removed under its shard lock, so a bucket
    /// re-armed by a concurrent `acquire` is kept.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        info!(target: "slashgate::rate_limit", "purging expired rate-limit buckets");
        let mut purged = 0usize;
        self.buckets.retain(|_, bucket| {
            let expired = bucket.is_expired(now);
            if expired {
                purged += 1;
            }
            !expired
        });
        info!(target: "slashgate::rate_limit", purged, live = self.buckets.len(), "purge done");
        purged
    }

    /// Live bucket count, expired-but-unpurged included.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no buckets exist.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether a bucket exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Point-in-time view of every bucket, sorted by key.
    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let now = self.clock.now_millis();
        let mut out: Vec<BucketSnapshot> = self
            .buckets
            .iter()
            .map(|entry| BucketSnapshot {
                key: entry.key().clone(),
                remaining: entry.value().remaining,
                resets_in: Duration::from_millis(entry.value().reset_at.saturating_sub(now)),
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}
