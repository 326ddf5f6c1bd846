//! # RocksDB Backend
//!
//! Durable `KeyValueStore` for long-running members. Wrap it in
//! `KvGroupStore` to get the group `Store`; the clock, drain checkpoints
//! and the genesis guard then survive restarts.
//!
//! Every write goes through a `WriteBatch` so a batch of index updates
//! lands atomically. Writes are fsynced unless `sync_writes` is off.

use rocksdb::{
    BlockBasedOptions, Cache, DBCompressionType, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::path::PathBuf;

use crate::domain::StoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};

/// Backend tuning.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Database directory, created when missing.
    pub path: PathBuf,
    /// LRU block cache, bytes.
    pub cache_bytes: usize,
    /// fsync every batch.
    pub sync_writes: bool,
}

impl RocksDbConfig {
    /// Defaults for a member database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache_bytes: 32 << 20,
            sync_writes: true,
        }
    }

    /// Skip fsync. Only for throwaway databases.
    pub fn without_sync(mut self) -> Self {
        self.sync_writes = false;
        self
    }
}

fn io(op: &'static str) -> impl FnOnce(rocksdb::Error) -> StoreError {
    move |e| StoreError::Io {
        message: format!("rocksdb {}: {}", op, e),
    }
}

/// RocksDB-backed `KeyValueStore`.
pub struct RocksDbStore {
    db: DB,
    sync_writes: bool,
}

impl RocksDbStore {
    /// Open or create the database described by `config`.
    pub fn open(config: &RocksDbConfig) -> Result<Self, StoreError> {
        let mut table = BlockBasedOptions::default();
        table.set_bloom_filter(10.0, false);
        table.set_block_cache(&Cache::new_lru_cache(config.cache_bytes));

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(DBCompressionType::Snappy);
        opts.set_block_based_table_factory(&table);

        let db = DB::open(&opts, &config.path).map_err(io("open"))?;
        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &opts).map_err(io("write"))
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(key).map_err(io("get"))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.put(key, value);
        self.write(batch)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.delete(key);
        self.write(batch)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(key, value),
                BatchOperation::Delete { key } => batch.delete(key),
            }
        }
        self.write(batch)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.db.get_pinned(key).map_err(io("get"))?.is_some())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        let mut found = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(io("scan"))?;
            if !key.starts_with(prefix) {
                break;
            }
            found.push((key.into_vec(), value.into_vec()));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::KvGroupStore;
    use crate::ports::outbound::Store;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RocksDbStore {
        RocksDbStore::open(&RocksDbConfig::new(dir.path()).without_sync()).unwrap()
    }

    #[test]
    fn test_prefix_scan_is_bounded_and_ordered() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        db.atomic_batch_write(vec![
            BatchOperation::put(b"out:2".to_vec(), b"2".to_vec()),
            BatchOperation::put(b"out:1".to_vec(), b"1".to_vec()),
            BatchOperation::put(b"outx".to_vec(), b"x".to_vec()),
            BatchOperation::put(b"tx:1".to_vec(), b"t".to_vec()),
        ])
        .unwrap();
        db.delete(b"out:2").unwrap();

        let keys: Vec<Vec<u8>> = db
            .prefix_scan(b"out:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"out:1".to_vec()]);
        assert!(db.exists(b"tx:1").unwrap());
    }

    #[test]
    fn test_group_properties_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = KvGroupStore::new(open(&dir));
            store.write_property("group-genesis-id", b"abc").unwrap();
        }
        let store = KvGroupStore::new(open(&dir));
        assert_eq!(
            store.read_property("group-genesis-id").unwrap(),
            Some(b"abc".to_vec())
        );
    }
}
