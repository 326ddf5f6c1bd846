//! Ordered in-memory `KeyValueStore`.
//!
//! Backs test groups and members that can afford to re-drain from the
//! group epoch after every restart.

use crate::domain::StoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use std::collections::BTreeMap;

/// In-memory key-value store for tests and ephemeral groups.
///
/// Keys are kept ordered so prefix scans match the RocksDB adapter.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let mut store = InMemoryKVStore::new();
        assert!(store.is_empty());

        store.put(b"prop:clock", b"1").unwrap();
        store.put(b"prop:genesis", b"2").unwrap();
        assert_eq!(store.get(b"prop:clock").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"prop:other").unwrap(), None);

        store.delete(b"prop:clock").unwrap();
        assert!(!store.exists(b"prop:clock").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_prefix_scan_is_ordered() {
        let mut store = InMemoryKVStore::new();
        store.put(b"a:3", b"3").unwrap();
        store.put(b"a:1", b"1").unwrap();
        store.put(b"b:1", b"x").unwrap();
        store.put(b"a:2", b"2").unwrap();

        let values: Vec<Vec<u8>> = store
            .prefix_scan(b"a:")
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn test_atomic_batch_write() {
        let mut store = InMemoryKVStore::new();
        store.put(b"gone", b"1").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"k".to_vec(), b"v".to_vec()),
                BatchOperation::delete(b"gone".to_vec()),
            ])
            .unwrap();
        assert!(store.exists(b"k").unwrap());
        assert!(!store.exists(b"gone").unwrap());
    }
}
