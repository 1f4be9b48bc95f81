//! Daily and total quotas.
//!
//! Usage counts live in the application's own database; this module only
//! reads them through [`QuotaLedger`] and compares them against the static
//! cap tables.

use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::decision::{DecidingLayer, RateLimitDecision};
use super::rules::{Limit, TierLimitTable};

/// Errors reported by a quota ledger.
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota ledger unavailable: {0}")]
    Unavailable(String),
}

/// Source of truth for persisted usage, supplied by the caller.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// How many times `subject` performed `operation` today (UTC).
    async fn daily_count(&self, subject: &str, operation: &str) -> Result<u64, QuotaError>;

    /// How many resources of `resource_kind` `subject` currently owns.
    async fn total_resource_count(&self, subject: &str, resource_kind: &str)
        -> Result<u64, QuotaError>;
}

/// Daily and total caps per tier.
#[derive(Debug, Clone, Default)]
pub struct QuotaPolicy {
    daily: TierLimitTable,
    total: TierLimitTable,
}

impl QuotaPolicy {
    /// Create a policy from its cap tables.
    pub fn new(daily: TierLimitTable, total: TierLimitTable) -> Self {
        Self { daily, total }
    }

    /// Whether one more `operation` fits in today's cap.
    pub async fn check_daily(
        &self,
        ledger: &dyn QuotaLedger,
        subject: &str,
        operation: &str,
        tier: &str,
    ) -> RateLimitDecision {
        let limit = self.daily.resolve(tier, operation);
        let reset = seconds_until_utc_midnight(Utc::now());
        let count = ledger.daily_count(subject, operation);
        Self::decide(limit, count, reset, subject, operation).await
    }

    /// Whether one more resource of `resource_kind` fits in the total cap.
    pub async fn check_total(
        &self,
        ledger: &dyn QuotaLedger,
        subject: &str,
        resource_kind: &str,
        tier: &str,
    ) -> RateLimitDecision {
        let limit = self.total.resolve(tier, resource_kind);
        let count = ledger.total_resource_count(subject, resource_kind);
        Self::decide(limit, count, 0, subject, resource_kind).await
    }

    async fn decide<F>(limit: Limit, count: F, reset_in_seconds: u64, subject: &str, what: &str) -> RateLimitDecision
    where
        F: std::future::Future<Output = Result<u64, QuotaError>>,
    {
        let max = match limit {
            Limit::Unlimited => return RateLimitDecision::unlimited(DecidingLayer::Quota),
            Limit::Max(max) => max,
        };

        // Final authorization: if usage cannot be read, refuse
        let (allowed, current_count) = match count.await {
            Ok(count) => (count < max, count),
            Err(e) => {
                warn!(subject = %subject, quota = %what, error = %e, "Quota ledger unavailable, refusing");
                (false, max)
            }
        };

        if !allowed {
            debug!(subject = %subject, quota = %what, count = current_count, limit = max, "Quota exceeded");
        }

        RateLimitDecision {
            allowed,
            current_count,
            limit: limit.as_i64(),
            reset_in_seconds,
            deciding_layer: DecidingLayer::Quota,
            degraded: false,
        }
    }
}

fn seconds_until_utc_midnight(now: DateTime<Utc>) -> u64 {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .map(|midnight| (midnight.and_utc() - now).num_seconds().max(0) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{DOMAIN_CREATE, RESOURCE_DOMAINS};
    use chrono::TimeZone;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FixedLedger {
        daily: HashMap<(String, String), u64>,
        total: HashMap<(String, String), u64>,
        broken: bool,
    }

    impl FixedLedger {
        fn with_daily(mut self, subject: &str, operation: &str, count: u64) -> Self {
            self.daily.insert((subject.to_string(), operation.to_string()), count);
            self
        }

        fn with_total(mut self, subject: &str, kind: &str, count: u64) -> Self {
            self.total.insert((subject.to_string(), kind.to_string()), count);
            self
        }
    }

    #[async_trait]
    impl QuotaLedger for FixedLedger {
        async fn daily_count(&self, subject: &str, operation: &str) -> Result<u64, QuotaError> {
            if self.broken {
                return Err(QuotaError::Unavailable("db down".to_string()));
            }
            Ok(self
                .daily
                .get(&(subject.to_string(), operation.to_string()))
                .copied()
                .unwrap_or(0))
        }

        async fn total_resource_count(&self, subject: &str, kind: &str) -> Result<u64, QuotaError> {
            if self.broken {
                return Err(QuotaError::Unavailable("db down".to_string()));
            }
            Ok(self
                .total
                .get(&(subject.to_string(), kind.to_string()))
                .copied()
                .unwrap_or(0))
        }
    }

    fn policy() -> QuotaPolicy {
        QuotaPolicy::new(TierLimitTable::default_daily(), TierLimitTable::default_total())
    }

    #[tokio::test]
    async fn test_daily_under_and_at_cap() {
        let ledger = FixedLedger::default()
            .with_daily("u1", DOMAIN_CREATE, 4)
            .with_daily("u2", DOMAIN_CREATE, 5);

        let d = policy().check_daily(&ledger, "u1", DOMAIN_CREATE, "free").await;
        assert!(d.allowed);
        assert_eq!(d.deciding_layer, DecidingLayer::Quota);
        assert!(d.reset_in_seconds <= 86_400);

        let d = policy().check_daily(&ledger, "u2", DOMAIN_CREATE, "free").await;
        assert!(!d.allowed);
        assert_eq!(d.limit, 5);
        assert_eq!(d.current_count, 5);
    }

    #[tokio::test]
    async fn test_total_resource_cap() {
        let ledger = FixedLedger::default().with_total("u1", RESOURCE_DOMAINS, 1);

        let d = policy().check_total(&ledger, "u1", RESOURCE_DOMAINS, "free").await;
        assert!(!d.allowed);
        assert_eq!(d.reset_in_seconds, 0);

        let d = policy().check_total(&ledger, "u1", RESOURCE_DOMAINS, "pro").await;
        assert!(d.allowed);
    }

    #[tokio::test]
    async fn test_unlimited_skips_ledger() {
        let ledger = FixedLedger {
            broken: true,
            ..Default::default()
        };
        let d = policy().check_total(&ledger, "u1", RESOURCE_DOMAINS, "enterprise").await;
        assert!(d.allowed);
        assert!(d.is_unlimited());
    }

    #[tokio::test]
    async fn test_ledger_failure_refuses() {
        let ledger = FixedLedger {
            broken: true,
            ..Default::default()
        };
        let d = policy().check_daily(&ledger, "u1", DOMAIN_CREATE, "pro").await;
        assert!(!d.allowed);
        assert_eq!(d.deciding_layer, DecidingLayer::Quota);
    }

    #[test]
    fn test_seconds_until_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 0).unwrap();
        assert_eq!(seconds_until_utc_midnight(now), 60);

        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(seconds_until_utc_midnight(now), 86_400);
    }
}
