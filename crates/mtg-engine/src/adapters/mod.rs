//! # Adapters Layer
//!
//! Implementations of the outbound ports.
//!
//! - `kv`: in-memory `KeyValueStore`
//! - `rocksdb`: durable `KeyValueStore` (feature `rocksdb`)
//! - `store`: `Store` over any `KeyValueStore`
//! - `network`: simulated custodial network for tests and local runs

pub mod kv;
pub mod network;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;
pub mod store;

pub use kv::InMemoryKVStore;
pub use network::{SimulatedClient, SimulatedNetwork};
#[cfg(feature = "rocksdb")]
pub use rocksdb::{RocksDbConfig, RocksDbStore};
pub use store::KvGroupStore;
