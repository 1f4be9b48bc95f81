//! Timeouts and bounded retries around a shared store.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CounterSnapshot, SharedStore, StoreError};
use crate::config::StoreConfig;

/// Timeout and retry budget applied to every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub backoff_base: Duration,
    /// Upper bound on any single delay
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for RetryPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (starting at 1), doubling each
    /// time and capped at `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Run `op` under this policy.
    pub async fn run<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            };

            match result {
                Ok(value) => return Ok(value),
                // Decoding failures will not improve with another attempt
                Err(e @ StoreError::Codec(_)) => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    warn!(operation = name, attempts = attempt + 1, error = %e, "Store call failed");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    debug!(
                        operation = name,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying store call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// A store wrapper applying a [`RetryPolicy`] to every call.
pub struct ResilientStore {
    inner: Arc<dyn SharedStore>,
    policy: RetryPolicy,
}

impl ResilientStore {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: Arc<dyn SharedStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl SharedStore for ResilientStore {
    async fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        self.policy
            .run("incr_with_expiry", || self.inner.incr_with_expiry(key, ttl))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.policy.run("get", || self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.policy.run("set_ex", || self.inner.set_ex(key, value, ttl)).await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.policy.run("del", || self.inner.del(key)).await
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.policy
            .run("del_if_eq", || self.inner.del_if_eq(key, expected))
            .await
    }
}
