//! Fixed-window rate limiter keyed by (tenant, event type, channel).
//!
//! Counters are process-local and advisory: they reset on restart and are not
//! shared between bridge instances.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::pipeline::types::Channel;

/// Length of every counting window, in seconds.
pub const WINDOW_SECS: i64 = 3600;

/// Counter key. Windows for distinct keys are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub tenant_id: String,
    pub event_type: String,
    pub channel: Channel,
}

impl RateLimitKey {
    pub fn new(tenant_id: impl Into<String>, event_type: impl Into<String>, channel: Channel) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            event_type: event_type.into(),
            channel,
        }
    }
}

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

/// Fixed-window counter store.
///
/// Each key lives in one shard of a `DashMap`; an update holds that shard's
/// write lock, so same-key updates are serialized while other shards proceed.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    entries: DashMap<RateLimitKey, RateLimitEntry>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(Duration::seconds(WINDOW_SECS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    /// Count one hit against `key` now. Returns whether it is allowed.
    pub fn check_and_increment(&self, key: &RateLimitKey, limit: u32) -> bool {
        self.check_and_increment_at(key, limit, Utc::now())
    }

    /// Count one hit against `key` at `now`.
    ///
    /// A key with no live window opens one with `count = 1`. Inside a window
    /// the hit is rejected, without counting, once `count >= limit`.
    pub fn check_and_increment_at(&self, key: &RateLimitKey, limit: u32, now: DateTime<Utc>) -> bool {
        if limit == 0 {
            return false;
        }

        let mut entry = self.entries.entry(key.clone()).or_insert(RateLimitEntry {
            count: 0,
            window_reset_at: now,
        });

        if entry.window_reset_at <= now {
            *entry = RateLimitEntry {
                count: 1,
                window_reset_at: now + self.window,
            };
            debug!(
                tenant_id = %key.tenant_id,
                event_type = %key.event_type,
                "Opened new rate-limit window"
            );
            return true;
        }

        if entry.count >= limit {
            return false;
        }

        entry.count += 1;
        true
    }

    /// Current state for `key`, if it has ever been hit.
    pub fn entry(&self, key: &RateLimitKey) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e)
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.window_reset_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically purge elapsed windows so idle keys do not accumulate.
pub fn spawn_purge_task(
    limiter: std::sync::Arc<RateLimiter>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.purge_expired(Utc::now());
            if removed > 0 {
                debug!(removed, "Purged expired rate-limit windows");
            }
        }
    })
}
