//! # Ports Layer
//!
//! Hexagonal architecture ports.
//!
//! - Inbound: `GroupApi`, what the group offers
//! - Outbound: `Store`, `KeyValueStore`, `CustodialNetwork`, `Worker`, `TimeSource`

pub mod inbound;
pub mod outbound;

pub use inbound::GroupApi;
pub use outbound::{
    BatchOperation, CustodialNetwork, GhostInput, GhostKeys, KeyValueStore, MockTimeSource,
    OutputsOrder, OutputsQuery, RawTransactionInfo, ScanResult, SignRequest, Store,
    SystemTimeSource, TimeSource, Worker,
};
