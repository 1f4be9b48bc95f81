//! Rate limiter trait for abstracting the decision source.

use async_trait::async_trait;

use super::decision::RateLimitDecision;

/// Trait for rate limiter implementations.
///
/// The HTTP service is generic over this trait so that it can be driven by
/// the full orchestrator or by a fixed decision source in tests.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether `subject` on `tier` may perform `operation` now.
    async fn check_rate_limit(&self, subject: &str, operation: &str, tier: &str)
        -> RateLimitDecision;
}
