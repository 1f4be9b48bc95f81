//! The answer returned for every rate limit check.

use serde::{Deserialize, Serialize};

use super::burst::BurstOutcome;
use crate::error::ErrorKind;

/// Which layer produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecidingLayer {
    Burst,
    Distributed,
    Quota,
}

/// Outcome of a rate limit or quota check. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub current_count: u64,
    /// `-1` when unlimited
    pub limit: i64,
    pub reset_in_seconds: u64,
    pub deciding_layer: DecidingLayer,
    /// Set when the distributed layer was unreachable and the burst
    /// decision was used in its place.
    #[serde(default)]
    pub degraded: bool,
}

impl RateLimitDecision {
    /// An allowed decision for an unlimited tier.
    pub fn unlimited(layer: DecidingLayer) -> Self {
        Self {
            allowed: true,
            current_count: 0,
            limit: -1,
            reset_in_seconds: 0,
            deciding_layer: layer,
            degraded: false,
        }
    }

    /// Lift a burst outcome into a decision.
    pub fn from_burst(outcome: &BurstOutcome, degraded: bool) -> Self {
        Self {
            allowed: outcome.allowed,
            current_count: outcome.current,
            limit: i64::try_from(outcome.limit).unwrap_or(i64::MAX),
            reset_in_seconds: outcome.reset_in_seconds,
            deciding_layer: DecidingLayer::Burst,
            degraded,
        }
    }

    /// Whether no limit applied.
    pub fn is_unlimited(&self) -> bool {
        self.limit < 0
    }

    /// Requests left in the window; `-1` when unlimited.
    pub fn remaining(&self) -> i64 {
        if self.is_unlimited() {
            return -1;
        }
        let used = i64::try_from(self.current_count).unwrap_or(i64::MAX);
        self.limit.saturating_sub(used).max(0)
    }

    /// The refusal reason, if this decision is a refusal.
    pub fn rejection_kind(&self) -> Option<ErrorKind> {
        if self.allowed {
            return None;
        }
        Some(match self.deciding_layer {
            DecidingLayer::Burst => ErrorKind::BurstExceeded,
            DecidingLayer::Distributed => ErrorKind::TierLimitExceeded,
            DecidingLayer::Quota => ErrorKind::QuotaExceeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(allowed: bool, count: u64, limit: i64, layer: DecidingLayer) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            current_count: count,
            limit,
            reset_in_seconds: 30,
            deciding_layer: layer,
            degraded: false,
        }
    }

    #[test]
    fn test_remaining() {
        assert_eq!(decision(true, 2, 5, DecidingLayer::Distributed).remaining(), 3);
        assert_eq!(decision(false, 7, 5, DecidingLayer::Distributed).remaining(), 0);
        assert_eq!(RateLimitDecision::unlimited(DecidingLayer::Distributed).remaining(), -1);
    }

    #[test]
    fn test_rejection_kind_follows_layer() {
        assert_eq!(decision(true, 1, 5, DecidingLayer::Burst).rejection_kind(), None);
        assert_eq!(
            decision(false, 5, 5, DecidingLayer::Burst).rejection_kind(),
            Some(ErrorKind::BurstExceeded)
        );
        assert_eq!(
            decision(false, 6, 5, DecidingLayer::Distributed).rejection_kind(),
            Some(ErrorKind::TierLimitExceeded)
        );
        assert_eq!(
            decision(false, 1, 1, DecidingLayer::Quota).rejection_kind(),
            Some(ErrorKind::QuotaExceeded)
        );
    }

    #[test]
    fn test_from_burst() {
        let outcome = BurstOutcome {
            allowed: false,
            current: 10,
            limit: 10,
            reset_in_seconds: 42,
        };
        let d = RateLimitDecision::from_burst(&outcome, true);
        assert!(!d.allowed);
        assert!(d.degraded);
        assert_eq!(d.deciding_layer, DecidingLayer::Burst);
        assert_eq!(d.limit, 10);
        assert_eq!(d.reset_in_seconds, 42);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_value(decision(true, 1, 3, DecidingLayer::Distributed)).unwrap();
        assert_eq!(json["currentCount"], 1);
        assert_eq!(json["resetInSeconds"], 30);
        assert_eq!(json["decidingLayer"], "distributed");
    }
}
