//! In-process burst guard.
//!
//! A fixed window per `(subject, operation)` held in local memory. It sheds
//! egregious bursts on this instance before they reach the shared store and
//! is not authoritative across instances.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::key::WindowKey;

/// State of one burst window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowRecord {
    /// Accepted requests in this window, at least 1 once created
    pub count: u64,
    /// When the window ends
    pub window_reset_at: Instant,
}

impl RateWindowRecord {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: now + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.window_reset_at
    }
}

/// Result of a burst check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstOutcome {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Count in the current window after this call
    pub current: u64,
    /// The limit that was applied
    pub limit: u64,
    /// Whole seconds until the window resets, rounded up
    pub reset_in_seconds: u64,
}

/// Fixed-window counters keyed by subject and operation.
///
/// Concurrent calls for the same key may race; the guard is approximate by
/// nature and the distributed layer behind it carries correctness.
#[derive(Debug, Default)]
pub struct BurstGuard {
    windows: DashMap<WindowKey, RateWindowRecord>,
}

impl BurstGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record a request.
    ///
    /// Rejected requests do not increment the window.
    pub fn check(&self, subject: &str, operation: &str, limit: u64, window: Duration) -> BurstOutcome {
        let now = Instant::now();
        let key = WindowKey::new(subject, operation);

        trace!(key = %key, limit = limit, "Checking burst window");

        if limit == 0 {
            return BurstOutcome {
                allowed: false,
                current: 0,
                limit,
                reset_in_seconds: ceil_secs(window),
            };
        }

        let (allowed, record) = match self.windows.entry(key.clone()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let record = occupied.get_mut();
                if record.count >= limit {
                    (false, *record)
                } else {
                    record.count += 1;
                    (true, *record)
                }
            }
            Entry::Occupied(mut occupied) => {
                let record = RateWindowRecord::open(now, window);
                occupied.insert(record);
                (true, record)
            }
            Entry::Vacant(vacant) => {
                let record = RateWindowRecord::open(now, window);
                vacant.insert(record);
                (true, record)
            }
        };

        if !allowed {
            debug!(key = %key, count = record.count, limit = limit, "Burst limit exceeded");
        }

        BurstOutcome {
            allowed,
            current: record.count,
            limit,
            reset_in_seconds: ceil_secs(record.window_reset_at.saturating_duration_since(now)),
        }
    }

    /// Remove windows that have already ended.
    ///
    /// Expiry is also checked lazily on every `check`, so this only bounds
    /// memory. Returns the number of windows removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, record| !record.is_expired(now));
        let removed = before.saturating_sub(self.windows.len());

        if removed > 0 {
            debug!(removed = removed, remaining = self.windows.len(), "Swept expired burst windows");
        }
        removed
    }

    /// The live window for a key, if any.
    pub fn window(&self, subject: &str, operation: &str) -> Option<RateWindowRecord> {
        let now = Instant::now();
        self.windows
            .get(&WindowKey::new(subject, operation))
            .map(|r| *r.value())
            .filter(|r| !r.is_expired(now))
    }

    /// Number of tracked windows, including expired ones not yet swept.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop every window.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
