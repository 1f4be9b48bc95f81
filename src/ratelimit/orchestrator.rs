//! Composition of the rate limiting layers.
//!
//! Evaluation order is fixed: the burst guard first (cheapest, no I/O), then
//! the distributed counter. The first layer to refuse decides. Quotas are
//! checked separately by the caller through [`RateLimitOrchestrator::check_daily_quota`]
//! and [`RateLimitOrchestrator::check_resource_quota`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::backend::RateLimiterBackend;
use super::burst::BurstGuard;
use super::decision::RateLimitDecision;
use super::distributed::DistributedCounter;
use super::quota::{QuotaLedger, QuotaPolicy};
use crate::config::RateLimitingConfig;
use crate::store::SharedStore;

/// Runs the burst and distributed layers in order.
pub struct RateLimitOrchestrator {
    burst: Arc<BurstGuard>,
    distributed: DistributedCounter,
    quota: QuotaPolicy,
    config: RateLimitingConfig,
}

impl RateLimitOrchestrator {
    /// Create an orchestrator over an existing burst guard and shared store.
    pub fn new(burst: Arc<BurstGuard>, store: Arc<dyn SharedStore>, config: RateLimitingConfig) -> Self {
        Self::with_distributed(
            burst,
            DistributedCounter::new(store, config.hourly.clone()),
            config,
        )
    }

    /// Create an orchestrator with a preconfigured distributed counter.
    pub fn with_distributed(
        burst: Arc<BurstGuard>,
        distributed: DistributedCounter,
        config: RateLimitingConfig,
    ) -> Self {
        let quota = QuotaPolicy::new(config.daily.clone(), config.total.clone());
        Self {
            burst,
            distributed,
            quota,
            config,
        }
    }

    /// Decide whether `subject` may perform `operation` now.
    #[instrument(skip(self), level = "trace")]
    pub async fn check(&self, subject: &str, operation: &str, tier: &str) -> RateLimitDecision {
        let rule = self.config.burst_rule(operation);
        let burst = self.burst.check(subject, operation, rule.limit, rule.window());

        if !burst.allowed {
            return RateLimitDecision::from_burst(&burst, false);
        }

        let decision = self
            .distributed
            .check_or_degrade(subject, operation, tier, &burst)
            .await;

        debug!(
            subject = %subject,
            operation = %operation,
            tier = %tier,
            allowed = decision.allowed,
            layer = ?decision.deciding_layer,
            degraded = decision.degraded,
            "Rate limit decision made"
        );

        decision
    }

    /// Whether one more `operation` fits in the subject's daily cap.
    pub async fn check_daily_quota(
        &self,
        ledger: &dyn QuotaLedger,
        subject: &str,
        operation: &str,
        tier: &str,
    ) -> RateLimitDecision {
        self.quota.check_daily(ledger, subject, operation, tier).await
    }

    /// Whether the subject may own one more resource of `resource_kind`.
    pub async fn check_resource_quota(
        &self,
        ledger: &dyn QuotaLedger,
        subject: &str,
        resource_kind: &str,
        tier: &str,
    ) -> RateLimitDecision {
        self.quota.check_total(ledger, subject, resource_kind, tier).await
    }

    /// The burst guard shared with the sweeper.
    pub fn burst_guard(&self) -> &Arc<BurstGuard> {
        &self.burst
    }
}

#[async_trait]
impl RateLimiterBackend for RateLimitOrchestrator {
    async fn check_rate_limit(&self, subject: &str, operation: &str, tier: &str) -> RateLimitDecision {
        self.check(subject, operation, tier).await
    }
}
