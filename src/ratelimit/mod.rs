//! Rate limiting layers and their composition.

mod backend;
mod burst;
mod decision;
mod distributed;
mod key;
mod orchestrator;
mod quota;
mod rules;
mod sweeper;

pub use backend::RateLimiterBackend;
pub use burst::{BurstGuard, BurstOutcome, RateWindowRecord};
pub use decision::{DecidingLayer, RateLimitDecision};
pub use distributed::{DistributedCounter, DISTRIBUTED_WINDOW};
pub use key::WindowKey;
pub use orchestrator::RateLimitOrchestrator;
pub use quota::{QuotaError, QuotaLedger, QuotaPolicy};
pub use rules::{
    BurstRule, Limit, TierLimitTable, API_KEY_CREATE, DOMAIN_CREATE, DOMAIN_VERIFY,
    RESOURCE_API_KEYS, RESOURCE_DOMAINS,
};
pub use sweeper::{BurstSweeper, SweeperHandle};
