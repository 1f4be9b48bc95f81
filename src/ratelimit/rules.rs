//! Static limit tables.
//!
//! Limits are configured per tier and per operation. A value of `-1` means
//! the tier is unlimited for that operation. Tables are read-only at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Operation name for API key issuance.
pub const API_KEY_CREATE: &str = "api-key-create";
/// Operation name for custom domain creation.
pub const DOMAIN_CREATE: &str = "domain-create";
/// Operation name for custom domain verification.
pub const DOMAIN_VERIFY: &str = "domain-verify";

/// Resource kind for custom domains.
pub const RESOURCE_DOMAINS: &str = "domains";
/// Resource kind for API keys.
pub const RESOURCE_API_KEYS: &str = "api-keys";

/// A resolved limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// No limit applies.
    Unlimited,
    /// At most this many.
    Max(u64),
}

impl Limit {
    /// The raw table value, `-1` for unlimited.
    pub fn as_i64(&self) -> i64 {
        match self {
            Limit::Unlimited => TierLimitTable::UNLIMITED,
            Limit::Max(n) => i64::try_from(*n).unwrap_or(i64::MAX),
        }
    }

    fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            TierLimitTable::UNLIMITED => Some(Limit::Unlimited),
            n if n >= 0 => Some(Limit::Max(n as u64)),
            _ => None,
        }
    }

    /// Ordering by restrictiveness: smaller caps win, unlimited loses.
    fn most_restrictive(a: Limit, b: Limit) -> Limit {
        match (a, b) {
            (Limit::Max(x), Limit::Max(y)) => Limit::Max(x.min(y)),
            (Limit::Max(x), Limit::Unlimited) | (Limit::Unlimited, Limit::Max(x)) => Limit::Max(x),
            (Limit::Unlimited, Limit::Unlimited) => Limit::Unlimited,
        }
    }
}

/// Mapping of `tier -> operation -> limit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierLimitTable {
    tiers: HashMap<String, HashMap<String, i64>>,
}

impl TierLimitTable {
    /// Table value meaning "no limit".
    pub const UNLIMITED: i64 = -1;

    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a single entry.
    pub fn with_limit(mut self, tier: &str, operation: &str, limit: i64) -> Self {
        self.tiers
            .entry(tier.to_string())
            .or_default()
            .insert(operation.to_string(), limit);
        self
    }

    /// Whether the table has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.tiers.values().all(|ops| ops.is_empty())
    }

    /// The configured entry, without any fallback.
    pub fn get(&self, tier: &str, operation: &str) -> Option<i64> {
        self.tiers.get(tier)?.get(operation).copied()
    }

    /// Resolve the limit for a tier and operation.
    ///
    /// A missing or malformed entry resolves to the most restrictive limit
    /// known for the operation across all tiers, then across the whole
    /// table, and finally to zero.
    pub fn resolve(&self, tier: &str, operation: &str) -> Limit {
        if let Some(limit) = self.get(tier, operation).and_then(Limit::from_raw) {
            return limit;
        }

        let fallback = self
            .most_restrictive_for(operation)
            .or_else(|| self.most_restrictive_overall())
            .unwrap_or(Limit::Max(0));

        warn!(
            tier = %tier,
            operation = %operation,
            fallback = fallback.as_i64(),
            "No valid limit configured, using most restrictive known limit"
        );

        fallback
    }

    fn most_restrictive_for(&self, operation: &str) -> Option<Limit> {
        self.tiers
            .values()
            .filter_map(|ops| ops.get(operation).copied().and_then(Limit::from_raw))
            .filter(|l| matches!(l, Limit::Max(_)))
            .reduce(Limit::most_restrictive)
    }

    fn most_restrictive_overall(&self) -> Option<Limit> {
        self.tiers
            .values()
            .flat_map(|ops| ops.values().copied().filter_map(Limit::from_raw))
            .filter(|l| matches!(l, Limit::Max(_)))
            .reduce(Limit::most_restrictive)
    }

    /// Default hourly limits for mutating operations.
    pub fn default_hourly() -> Self {
        Self::new()
            .with_limit("anonymous", API_KEY_CREATE, 1)
            .with_limit("anonymous", DOMAIN_CREATE, 1)
            .with_limit("anonymous", DOMAIN_VERIFY, 3)
            .with_limit("free", API_KEY_CREATE, 5)
            .with_limit("free", DOMAIN_CREATE, 3)
            .with_limit("free", DOMAIN_VERIFY, 10)
            .with_limit("pro", API_KEY_CREATE, 50)
            .with_limit("pro", DOMAIN_CREATE, 20)
            .with_limit("pro", DOMAIN_VERIFY, 60)
            .with_limit("enterprise", API_KEY_CREATE, Self::UNLIMITED)
            .with_limit("enterprise", DOMAIN_CREATE, Self::UNLIMITED)
            .with_limit("enterprise", DOMAIN_VERIFY, Self::UNLIMITED)
    }

    /// Default daily caps.
    pub fn default_daily() -> Self {
        Self::new()
            .with_limit("anonymous", API_KEY_CREATE, 2)
            .with_limit("anonymous", DOMAIN_CREATE, 1)
            .with_limit("free", API_KEY_CREATE, 10)
            .with_limit("free", DOMAIN_CREATE, 5)
            .with_limit("pro", API_KEY_CREATE, 200)
            .with_limit("pro", DOMAIN_CREATE, 100)
            .with_limit("enterprise", API_KEY_CREATE, Self::UNLIMITED)
            .with_limit("enterprise", DOMAIN_CREATE, Self::UNLIMITED)
    }

    /// Default total resource caps, keyed by resource kind.
    pub fn default_total() -> Self {
        Self::new()
            .with_limit("anonymous", RESOURCE_DOMAINS, 0)
            .with_limit("anonymous", RESOURCE_API_KEYS, 1)
            .with_limit("free", RESOURCE_DOMAINS, 1)
            .with_limit("free", RESOURCE_API_KEYS, 5)
            .with_limit("pro", RESOURCE_DOMAINS, 25)
            .with_limit("pro", RESOURCE_API_KEYS, 50)
            .with_limit("enterprise", RESOURCE_DOMAINS, Self::UNLIMITED)
            .with_limit("enterprise", RESOURCE_API_KEYS, Self::UNLIMITED)
    }
}

/// In-process burst allowance for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstRule {
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl BurstRule {
    /// The window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for BurstRule {
    fn default() -> Self {
        Self {
            limit: 10,
            window_ms: 60_000,
        }
    }
}
