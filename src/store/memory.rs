//! In-process implementation of the shared store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{CounterSnapshot, SharedStore, StoreError};

/// Entry count below which inserts never trigger a sweep.
const MIN_SWEEP_THRESHOLD: usize = 256;

#[derive(Debug, Clone)]
enum Value {
    Counter(u64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Map size at which the next insert sweeps expired entries
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_THRESHOLD,
        }
    }
}

impl Entries {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_THRESHOLD);
        before - self.map.len()
    }

    fn insert(&mut self, key: &str, entry: Entry, now: Instant) {
        if self.map.len() >= self.sweep_at && !self.map.contains_key(key) {
            let removed = self.sweep(now);
            if removed > 0 {
                debug!(removed = removed, remaining = self.map.len(), "Swept expired store entries");
            }
        }
        self.map.insert(key.to_string(), entry);
    }
}

/// A store that lives in local memory.
///
/// Entries expire lazily on access, and expired entries are swept once the
/// map doubles past its last swept size. Only meaningful across tasks of one
/// process; use [`super::RedisStore`] when several instances must agree.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().map.values().filter(|e| e.is_live(now)).count()
    }

    /// Whether the store has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.entries.lock().sweep(Instant::now())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.map.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let count = match &mut entry.value {
                    Value::Counter(count) => {
                        *count += 1;
                        *count
                    }
                    Value::Text(_) => {
                        return Err(StoreError::Codec(format!("{} is not a counter", key)))
                    }
                };
                Ok(CounterSnapshot {
                    count,
                    ttl: entry.expires_at.saturating_duration_since(now),
                })
            }
            _ => {
                let entry = Entry {
                    value: Value::Counter(1),
                    expires_at: now + ttl,
                };
                entries.insert(key, entry, now);
                Ok(CounterSnapshot { count: 1, ttl })
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(match &entry.value {
                Value::Counter(count) => count.to_string(),
                Value::Text(text) => text.clone(),
            })),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let entry = Entry {
            value: Value::Text(value.to_string()),
            expires_at: now + ttl,
        };
        self.entries.lock().insert(key, entry, now);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .map
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let matches = entries.map.get(key).is_some_and(|entry| {
            entry.is_live(now) && matches!(&entry.value, Value::Text(text) if text == expected)
        });
        if matches {
            entries.map.remove(key);
        }
        Ok(matches)
    }
}
