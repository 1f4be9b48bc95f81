//! Distributed per-tier counter backed by the shared store.
//!
//! Each `(operation, subject)` pair gets a fixed one-hour window: the first
//! increment creates the key and sets its expiry, later increments never
//! refresh it. Rejected requests still count against the window.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::burst::{ceil_secs, BurstOutcome};
use super::decision::{DecidingLayer, RateLimitDecision};
use super::rules::{Limit, TierLimitTable};
use crate::store::{CounterKey, SharedStore, StoreError};

/// Length of a distributed counter window.
pub const DISTRIBUTED_WINDOW: Duration = Duration::from_secs(3600);

/// A rate limiter whose counters live in the shared store.
pub struct DistributedCounter {
    /// Shared state across instances
    store: Arc<dyn SharedStore>,
    /// Hourly limits per tier and operation
    limits: TierLimitTable,
    /// Window length
    window: Duration,
}

impl DistributedCounter {
    /// Create a new distributed counter with hourly windows.
    pub fn new(store: Arc<dyn SharedStore>, limits: TierLimitTable) -> Self {
        Self::with_window(store, limits, DISTRIBUTED_WINDOW)
    }

    /// Create a new distributed counter with a custom window length.
    pub fn with_window(store: Arc<dyn SharedStore>, limits: TierLimitTable, window: Duration) -> Self {
        Self {
            store,
            limits,
            window,
        }
    }

    /// The limit table in use.
    pub fn limits(&self) -> &TierLimitTable {
        &self.limits
    }

    /// Check and record a request.
    ///
    /// Unlimited tiers are allowed without touching the store.
    pub async fn check(
        &self,
        subject: &str,
        operation: &str,
        tier: &str,
    ) -> Result<RateLimitDecision, StoreError> {
        let limit = match self.limits.resolve(tier, operation) {
            Limit::Unlimited => {
                trace!(subject = %subject, operation = %operation, tier = %tier, "Unlimited tier");
                return Ok(RateLimitDecision::unlimited(DecidingLayer::Distributed));
            }
            Limit::Max(limit) => limit,
        };

        let key = CounterKey::new(operation, subject);

        trace!(key = %key, tier = %tier, limit = limit, "Checking distributed rate limit");

        let snapshot = self
            .store
            .incr_with_expiry(&key.to_store_key(), self.window)
            .await?;

        let allowed = snapshot.count <= limit;
        if !allowed {
            debug!(
                key = %key,
                tier = %tier,
                count = snapshot.count,
                limit = limit,
                "Distributed rate limit exceeded"
            );
        }

        Ok(RateLimitDecision {
            allowed,
            current_count: snapshot.count,
            limit: Limit::Max(limit).as_i64(),
            reset_in_seconds: ceil_secs(snapshot.ttl),
            deciding_layer: DecidingLayer::Distributed,
            degraded: false,
        })
    }

    /// Like [`check`](Self::check), but never fails: when the store cannot
    /// be reached the burst outcome is returned in its place.
    pub async fn check_or_degrade(
        &self,
        subject: &str,
        operation: &str,
        tier: &str,
        burst: &BurstOutcome,
    ) -> RateLimitDecision {
        match self.check(subject, operation, tier).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    subject = %subject,
                    operation = %operation,
                    error = %e,
                    "Shared store unavailable, falling back to burst guard decision"
                );
                RateLimitDecision::from_burst(burst, true)
            }
        }
    }
}
