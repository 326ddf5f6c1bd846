//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the engine requires the host application to provide.
//!
//! | Port | Production | Testing |
//! |------|------------|---------|
//! | `Store` | `KvGroupStore<RocksDbStore>` | `KvGroupStore<InMemoryKVStore>` |
//! | `KeyValueStore` | `RocksDbStore` (feature `rocksdb`) | `InMemoryKVStore` |
//! | `CustodialNetwork` | host RPC client | `SimulatedNetwork` |
//! | `Worker` | application | test workers |
//! | `TimeSource` | `SystemTimeSource` | `MockTimeSource` |

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use crate::domain::{
    ActionState, Amount, CollectibleOutput, CollectibleTransaction, Hash32, Iteration,
    NetworkError, Output, OutputState, RawOutput, StoreError, Transaction, TransactionState,
    UnifiedOutput,
};
use crate::ports::inbound::GroupApi;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Persistence required by the group.
///
/// Single reads return `None` when absent. Lists are ordered oldest
/// first. Output and transaction writes never move a stored state
/// backwards; a regressing write is ignored.
pub trait Store: Send + Sync {
    /// Read an opaque property.
    fn read_property(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write an opaque property.
    fn write_property(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Append a membership change. Writing the same entry twice is a no-op.
    fn write_iteration(&self, ir: &Iteration) -> Result<(), StoreError>;

    /// Membership log in effect order.
    fn list_iterations(&self) -> Result<Vec<Iteration>, StoreError>;

    /// Upsert a fungible output. `None` keeps any trace id already assigned.
    fn write_output(&self, out: &Output, trace_id: Option<Uuid>) -> Result<(), StoreError>;

    /// Upsert several outputs atomically.
    fn write_outputs(&self, outs: &[Output], trace_id: Option<Uuid>) -> Result<(), StoreError>;

    /// Outputs assigned to a transaction, oldest first.
    fn list_outputs_for_transaction(&self, trace_id: Uuid) -> Result<Vec<Output>, StoreError>;

    /// Outputs of one group and asset in one state, oldest first. `limit == 0` means all.
    fn list_outputs_for_asset(
        &self,
        group_id: &str,
        asset_id: Uuid,
        state: OutputState,
        limit: usize,
    ) -> Result<Vec<Output>, StoreError>;

    /// Record an action for an output. A `Done` action never returns to `Initial`.
    fn write_action(&self, out: &UnifiedOutput, state: ActionState) -> Result<(), StoreError>;

    /// Pending actions, oldest output first.
    fn list_actions(&self, limit: usize) -> Result<Vec<UnifiedOutput>, StoreError>;

    /// Insert if no transaction has this trace id. Returns whether it was inserted.
    fn create_transaction(&self, tx: &Transaction) -> Result<bool, StoreError>;

    /// Upsert a transaction.
    fn write_transaction(&self, tx: &Transaction) -> Result<(), StoreError>;

    /// Read by trace id.
    fn read_transaction(&self, trace_id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// Read by payload hash.
    fn read_transaction_by_hash(&self, hash: &Hash32) -> Result<Option<Transaction>, StoreError>;

    /// Transactions in one state, least recently updated first. `limit == 0` means all.
    fn list_transactions(
        &self,
        state: TransactionState,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Remove a transaction and its indexes.
    fn delete_transaction(&self, trace_id: Uuid) -> Result<(), StoreError>;

    /// Upsert a collectible output.
    fn write_collectible_output(
        &self,
        out: &CollectibleOutput,
        trace_id: Option<Uuid>,
    ) -> Result<(), StoreError>;

    /// Upsert several collectible outputs atomically.
    fn write_collectible_outputs(
        &self,
        outs: &[CollectibleOutput],
        trace_id: Option<Uuid>,
    ) -> Result<(), StoreError>;

    /// Collectible outputs assigned to a transaction, oldest first.
    fn list_collectible_outputs_for_transaction(
        &self,
        trace_id: Uuid,
    ) -> Result<Vec<CollectibleOutput>, StoreError>;

    /// Collectible outputs of a token in one state, oldest first.
    fn list_collectible_outputs_for_token(
        &self,
        token_id: Uuid,
        state: OutputState,
        limit: usize,
    ) -> Result<Vec<CollectibleOutput>, StoreError>;

    /// Insert if absent. Returns whether it was inserted.
    fn create_collectible_transaction(
        &self,
        tx: &CollectibleTransaction,
    ) -> Result<bool, StoreError>;

    /// Upsert a collectible transaction.
    fn write_collectible_transaction(&self, tx: &CollectibleTransaction)
        -> Result<(), StoreError>;

    /// Read by trace id.
    fn read_collectible_transaction(
        &self,
        trace_id: Uuid,
    ) -> Result<Option<CollectibleTransaction>, StoreError>;

    /// Read by payload hash.
    fn read_collectible_transaction_by_hash(
        &self,
        hash: &Hash32,
    ) -> Result<Option<CollectibleTransaction>, StoreError>;

    /// Collectible transactions in one state, least recently updated first.
    fn list_collectible_transactions(
        &self,
        state: TransactionState,
        limit: usize,
    ) -> Result<Vec<CollectibleTransaction>, StoreError>;
}

/// Abstract interface for key-value database operations.
///
/// Production: `RocksDbStore` (adapters/rocksdb.rs)
/// Testing: `InMemoryKVStore` (adapters/kv.rs)
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// Key-value pairs under a prefix, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, StoreError>;
}

/// Result of a prefix scan.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

// =============================================================================
// CUSTODIAL NETWORK
// =============================================================================

/// Feed ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputsOrder {
    /// By creation time.
    Created,
    /// By last update time.
    Updated,
}

impl OutputsOrder {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputsOrder::Created => "created",
            OutputsOrder::Updated => "updated",
        }
    }

    /// The timestamp this ordering sorts by.
    pub fn timestamp_of(&self, out: &UnifiedOutput) -> DateTime<Utc> {
        match self {
            OutputsOrder::Created => out.created_at,
            OutputsOrder::Updated => out.updated_at,
        }
    }
}

/// Feed page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputsQuery {
    /// `hash_members` of the group.
    pub members_hash: Hash32,
    /// Group threshold.
    pub threshold: u8,
    /// Inclusive lower bound on the ordering timestamp.
    pub offset: DateTime<Utc>,
    /// Page size.
    pub limit: usize,
    /// Ordering.
    pub order: OutputsOrder,
}

/// Ghost key allocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostInput {
    /// Receivers of the output.
    pub receivers: Vec<Uuid>,
    /// Output index in the transaction.
    pub index: u32,
    /// Deterministic hint, the trace id.
    pub hint: Uuid,
}

/// One-time keys for one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostKeys {
    /// Mask.
    pub mask: Hash32,
    /// One key per receiver.
    pub keys: Vec<Hash32>,
}

impl GhostKeys {
    /// Output locked to these keys.
    pub fn dump_output(&self, threshold: u8, amount: Amount) -> RawOutput {
        RawOutput {
            amount,
            keys: self.keys.clone(),
            mask: self.mask,
            threshold,
        }
    }
}

/// Multisig or collectible signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    /// Request id.
    pub request_id: Uuid,
    /// Raw transaction with all signatures collected so far, hex.
    pub raw_transaction: String,
}

/// Network view of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransactionInfo {
    /// Payload hash.
    pub hash: Hash32,
    /// Snapshot hash once included.
    pub snapshot: Option<Hash32>,
}

/// Custodial network client.
#[async_trait]
pub trait CustodialNetwork: Send + Sync {
    /// One page of the group's output feed.
    async fn list_outputs(&self, query: &OutputsQuery) -> Result<Vec<UnifiedOutput>, NetworkError>;

    /// Allocate ghost keys, one entry per input.
    async fn read_ghost_keys(&self, inputs: &[GhostInput]) -> Result<Vec<GhostKeys>, NetworkError>;

    /// Open a multisig signing request for a raw transaction (hex).
    async fn create_multisig_request(&self, raw: &str) -> Result<SignRequest, NetworkError>;

    /// Sign a multisig request with the member PIN.
    async fn sign_multisig_request(
        &self,
        request_id: Uuid,
        pin: &str,
    ) -> Result<SignRequest, NetworkError>;

    /// Open a collectible signing request.
    async fn create_collectible_request(&self, raw: &str) -> Result<SignRequest, NetworkError>;

    /// Sign a collectible request with the member PIN.
    async fn sign_collectible_request(
        &self,
        request_id: Uuid,
        pin: &str,
    ) -> Result<SignRequest, NetworkError>;

    /// Broadcast a fully signed transaction (hex). Returns its payload hash.
    async fn send_raw_transaction(&self, raw: &str) -> Result<Hash32, NetworkError>;

    /// Look up a broadcast transaction.
    async fn get_raw_transaction(
        &self,
        hash: &Hash32,
    ) -> Result<Option<RawTransactionInfo>, NetworkError>;

    /// Check the member PIN.
    async fn verify_pin(&self, pin: &str) -> Result<(), NetworkError>;
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Application handler for drained outputs.
///
/// Workers are tried in registration order; the first returning `true`
/// claims the output and later workers are skipped.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Handle a fungible output.
    async fn process_output(&self, group: &dyn GroupApi, out: &Output) -> bool;

    /// Handle a collectible output.
    async fn process_collectible_output(
        &self,
        group: &dyn GroupApi,
        out: &CollectibleOutput,
    ) -> bool;
}

// =============================================================================
// TIME
// =============================================================================

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Current wall time.
    fn now(&self) -> DateTime<Utc>;
}

/// Default time source using system time.
#[derive(Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controllable time source.
///
/// Every read advances the time by `step`, which lets a waiting clock
/// make progress without real sleeps.
pub struct MockTimeSource {
    nanos: AtomicI64,
    step: i64,
}

impl MockTimeSource {
    /// Frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_step(start, Duration::zero())
    }

    /// Starting at `start`, advancing `step` per read.
    pub fn with_step(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            nanos: AtomicI64::new(start.timestamp_nanos_opt().unwrap_or(0)),
            step: step.num_nanoseconds().unwrap_or(0),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.num_nanoseconds().unwrap_or(0), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        self.nanos
            .store(to.timestamp_nanos_opt().unwrap_or(0), Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> DateTime<Utc> {
        let nanos = self.nanos.fetch_add(self.step, Ordering::SeqCst);
        crate::domain::from_nanos(nanos.max(0) as u64)
    }
}
