//! Shared key-value store used by the distributed layers.
//!
//! The distributed counter and the proof-of-work gate both keep their state
//! in a store shared by every instance. Production deployments use Redis;
//! the in-memory implementation serves tests and single-node setups.

mod memory;
mod redis;
mod resilient;
#[cfg(test)]
pub(crate) mod testing;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::resilient::{ResilientStore, RetryPolicy};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by shared store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored value could not be decoded: {0}")]
    Codec(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Counter value and remaining lifetime after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Value after the increment
    pub count: u64,
    /// Time left before the key expires
    pub ttl: Duration,
}

/// A key-value store shared across processes.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically increment `key`, setting its expiry to `ttl` only when the
    /// increment created it. Returns the new value and the remaining TTL.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration)
        -> Result<CounterSnapshot, StoreError>;

    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a string value with an expiry, replacing any previous value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete a key. Returns `true` only if this call removed it.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically delete `key` only while it still holds `expected`.
    /// Returns `true` only if this call removed it.
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}

/// Key identifying a distributed rate limit counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The operation being limited.
    pub operation: String,
    /// The subject the limit is scoped to.
    pub subject: String,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(operation: &str, subject: &str) -> Self {
        Self {
            operation: operation.to_string(),
            subject: subject.to_string(),
        }
    }

    /// Format: "ratelimit:{operation}:{subject}"
    pub fn to_store_key(&self) -> String {
        format!("ratelimit:{}:{}", self.operation, self.subject)
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_store_key())
    }
}

/// Key under which a subject's live challenge is stored.
pub fn challenge_key(purpose: &str, subject: &str) -> String {
    format!("pow:{}:{}", purpose, subject)
}
