//! # MTG Engine
//!
//! Coordination engine for a Mixin Trusted Group: a fixed set of members
//! jointly custody assets behind a threshold multisig. No leader and no
//! member-to-member traffic. Every member drains the same output feed from
//! the custodial network and deterministically derives the same spends, so
//! signatures converge on identical payloads.
//!
//! ## Tick
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────────┐   ┌──────────┐
//! │ drain     │──→│ handle       │──→│ sign fungible +  │──→│ publish  │
//! │ outputs   │   │ actions      │   │ collectible      │   │ signed   │
//! │ (2 orders)│   │ (workers)    │   │ (1 per tick)     │   │          │
//! └───────────┘   └──────────────┘   └──────────────────┘   └──────────┘
//! ```
//!
//! ## Transaction Lifecycle
//!
//! ```text
//! [Initial] ──sign──→ [Signing] ──threshold──→ [Signed] ──broadcast──→ [Snapshot]
//! ```
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | States never move backwards | `adapters/store.rs` merge rules |
//! | A trace id is built once | `Store::create_transaction` |
//! | Clock never regresses | `service/clock.rs` |
//! | Only group-built spends become actions | `service/drain.rs` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - KV stores, KvGroupStore, SimulatedNetwork          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - GroupApi                                   │
//! │  ports/outbound.rs - Store, CustodialNetwork, Worker, TimeSource│
//! │  service/          - Group orchestrator and its phases          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/     - outputs, transactions, iterations, errors        │
//! │  codec/      - memo pack and NFO envelope                       │
//! │  algorithms/ - input selection, compaction trace                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = GroupConfig::load("config.toml")?;
//! let store = Arc::new(KvGroupStore::new(InMemoryKVStore::new()));
//! let mut group = Group::build(&config, store, network, Arc::new(SystemTimeSource)).await?;
//! group.add_worker(Arc::new(MyWorker));
//! group.run(shutdown_rx).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod codec;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod telemetry;

pub use adapters::{InMemoryKVStore, KvGroupStore, SimulatedClient, SimulatedNetwork};
pub use codec::{ExtraPack, NfoMemo};
pub use config::{ConfigError, EngineSettings, GroupConfig};
pub use domain::{
    Amount, CollectibleOutput, CollectibleTransaction, CollectibleTransferParams, MtgError,
    Output, OutputState, Transaction, TransactionState, TransferParams,
};
pub use ports::{CustodialNetwork, GroupApi, Store, SystemTimeSource, TimeSource, Worker};
pub use service::{Group, OutputGrouper};
pub use telemetry::{init_tracing, TelemetryError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
