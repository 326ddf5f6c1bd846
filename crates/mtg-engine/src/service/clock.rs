//! # Monotonic Clock
//!
//! Strictly increasing timestamps that survive restarts. Every returned
//! value is persisted before it is handed out, so a restarted member never
//! reuses a timestamp.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{decode_nanos, encode_nanos, StoreError};
use crate::ports::outbound::{Store, TimeSource};

/// Property holding the last returned timestamp.
pub const CLOCK_PROPERTY_KEY: &str = "MTG:GROUP:CLOCK:MONOTONIC";

const WAIT_STEP: Duration = Duration::from_millis(1);
const PERSIST_RETRY: Duration = Duration::from_millis(100);

/// Persisted monotonic clock.
pub struct Clock {
    store: Arc<dyn Store>,
    time: Arc<dyn TimeSource>,
    last: Mutex<DateTime<Utc>>,
}

impl Clock {
    /// Seed from the later of the persisted value and wall time.
    pub fn new(store: Arc<dyn Store>, time: Arc<dyn TimeSource>) -> Result<Self, StoreError> {
        let wall = time.now();
        let seed = match store
            .read_property(CLOCK_PROPERTY_KEY)?
            .and_then(|b| decode_nanos(&b))
        {
            Some(persisted) if persisted > wall => persisted,
            _ => wall,
        };
        Ok(Self {
            store,
            time,
            last: Mutex::new(seed),
        })
    }

    /// Next timestamp, strictly after every earlier one.
    pub async fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().await;
        let mut now = self.time.now();
        while now <= *last {
            tokio::time::sleep(WAIT_STEP).await;
            now = self.time.now();
        }

        let val = encode_nanos(&now);
        while let Err(e) = self.store.write_property(CLOCK_PROPERTY_KEY, &val) {
            warn!("[mtg] clock persist failed, retrying: {}", e);
            tokio::time::sleep(PERSIST_RETRY).await;
        }

        *last = now;
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryKVStore, KvGroupStore};
    use crate::ports::outbound::{BatchOperation, KeyValueStore, MockTimeSource, ScanResult};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> Arc<dyn Store> {
        Arc::new(KvGroupStore::new(InMemoryKVStore::new()))
    }

    fn stepping(secs: i64) -> Arc<dyn TimeSource> {
        Arc::new(MockTimeSource::with_step(
            Utc.timestamp_opt(secs, 0).unwrap(),
            ChronoDuration::microseconds(1),
        ))
    }

    #[tokio::test]
    async fn test_strictly_increasing() {
        let clock = Clock::new(store(), stepping(1_000)).unwrap();
        let mut prev = clock.now().await;
        for _ in 0..100 {
            let next = clock.now().await;
            assert!(next > prev);
            prev = next;
        }
    }

    #[tokio::test]
    async fn test_persists_every_value() {
        let store = store();
        let clock = Clock::new(store.clone(), stepping(1_000)).unwrap();
        let ts = clock.now().await;
        let persisted = store.read_property(CLOCK_PROPERTY_KEY).unwrap().unwrap();
        assert_eq!(decode_nanos(&persisted), Some(ts));
    }

    #[tokio::test]
    async fn test_restart_with_wall_clock_behind() {
        let store = store();
        let before = {
            let clock = Clock::new(store.clone(), stepping(2_000)).unwrap();
            clock.now().await
        };
        // Wall time went backwards across the restart.
        let time = Arc::new(MockTimeSource::with_step(
            Utc.timestamp_opt(1_000, 0).unwrap(),
            ChronoDuration::seconds(100),
        ));
        let clock = Clock::new(store, time).unwrap();
        assert!(clock.now().await > before);
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_distinct_values() {
        let clock = Arc::new(Clock::new(store(), stepping(1_000)).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = clock.clone();
            handles.push(tokio::spawn(async move { c.now().await }));
        }
        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap());
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 8);
    }

    /// Rejects the first `failures` puts.
    struct FlakyKv {
        inner: InMemoryKVStore,
        failures: usize,
        puts: Arc<AtomicUsize>,
    }

    impl KeyValueStore for FlakyKv {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key)
        }

        fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
            if self.puts.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(StoreError::Io {
                    message: "disk full".to_string(),
                });
            }
            self.inner.put(key, value)
        }

        fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
            self.inner.delete(key)
        }

        fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
            self.inner.atomic_batch_write(operations)
        }

        fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
            self.inner.exists(key)
        }

        fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, StoreError> {
            self.inner.prefix_scan(prefix)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_persist_is_retried_before_returning() {
        let puts = Arc::new(AtomicUsize::new(0));
        let store: Arc<dyn Store> = Arc::new(KvGroupStore::new(FlakyKv {
            inner: InMemoryKVStore::new(),
            failures: 3,
            puts: puts.clone(),
        }));
        let clock = Clock::new(store.clone(), stepping(1_000)).unwrap();

        let ts = clock.now().await;
        assert_eq!(puts.load(Ordering::SeqCst), 4);
        let persisted = store.read_property(CLOCK_PROPERTY_KEY).unwrap().unwrap();
        assert_eq!(decode_nanos(&persisted), Some(ts));

        let next = clock.now().await;
        assert!(next > ts);
        assert_eq!(puts.load(Ordering::SeqCst), 5);
    }
}
