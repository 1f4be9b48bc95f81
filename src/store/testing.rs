//! Store fakes shared by unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{CounterSnapshot, SharedStore, StoreError};

/// A store whose every call fails, counting the attempts.
#[derive(Debug, Default)]
pub(crate) struct DownStore {
    pub(crate) calls: AtomicUsize,
}

impl DownStore {
    fn refuse<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".to_string()))
    }
}

#[async_trait]
impl SharedStore for DownStore {
    async fn incr_with_expiry(&self, _: &str, _: Duration) -> Result<CounterSnapshot, StoreError> {
        self.refuse()
    }

    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        self.refuse()
    }

    async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
        self.refuse()
    }

    async fn del(&self, _: &str) -> Result<bool, StoreError> {
        self.refuse()
    }

    async fn del_if_eq(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        self.refuse()
    }
}
