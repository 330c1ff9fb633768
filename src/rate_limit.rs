//! Fixed-window request limiter keyed by client identifier.
//!
//! Each identifier owns one window: the first request opens it, requests up
//! to `max_requests` inside it are allowed, and anything beyond is rejected
//! until the window has elapsed. A rejected request does not bump the
//! stored count, so the counter saturates at `max_requests`.
//!
//! The store is bounded. Expired windows are dropped by [`RateLimiter::sweep`]
//! (driven by a background task in the binary) and, when a new identifier
//! arrives at a full store, the uncapped entry closest to expiry is evicted.
//! A capped entry is never evicted before its window ends. If every entry is
//! capped, the new identifier is admitted without being tracked.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    /// Budget the entry was last checked against.
    pub limit: u32,
    pub reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    pub reset_at: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitRecord>>,
    max_entries: usize,
}

impl RateLimiter {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn check(&self, identifier: &str, window: Duration, max_requests: u32) -> RateLimitDecision {
        self.check_at(identifier, window, max_requests, Instant::now())
    }

    /// `check` with an explicit clock, for tests and the sweep task.
    pub fn check_at(
        &self,
        identifier: &str,
        window: Duration,
        max_requests: u32,
        now: Instant,
    ) -> RateLimitDecision {
        if !self.entries.contains_key(identifier)
            && self.entries.len() >= self.max_entries
            && !self.make_room(now)
        {
            tracing::warn!(
                max_entries = self.max_entries,
                "rate limit store full of capped clients, admitting untracked"
            );
            return RateLimitDecision {
                allowed: max_requests >= 1,
                remaining: max_requests.saturating_sub(1),
                reset_at: now + window,
            };
        }
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                limit: max_requests,
                reset_at: now + window,
            });
        let record = entry.value_mut();
        record.limit = max_requests;
        if record.count == 0 || now > record.reset_at {
            record.count = 1;
            record.reset_at = now + window;
            return RateLimitDecision {
                allowed: max_requests >= 1,
                remaining: max_requests.saturating_sub(1),
                reset_at: record.reset_at,
            };
        }
        if record.count < max_requests {
            record.count += 1;
            return RateLimitDecision {
                allowed: true,
                remaining: max_requests - record.count,
                reset_at: record.reset_at,
            };
        }
        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: record.reset_at,
        }
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, rec| now <= rec.reset_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.entries.get(identifier).map(|r| *r.value())
    }

    /// Free one slot for a new identifier. Returns false when every entry
    /// is capped inside its window.
    fn make_room(&self, now: Instant) -> bool {
        let swept = self.sweep(now);
        if swept > 0 {
            tracing::debug!(swept, "rate limit store swept on insert");
        }
        if self.entries.len() < self.max_entries {
            return true;
        }
        let oldest = self
            .entries
            .iter()
            .filter(|e| e.value().count < e.value().limit)
            .min_by_key(|e| e.value().reset_at)
            .map(|e| e.key().clone());
        match oldest {
            Some(key) => {
                self.entries.remove(&key);
                tracing::debug!(max_entries = self.max_entries, "rate limit store full, evicted oldest window");
                true
            }
            None => false,
        }
    }
}
