//! # Group Store
//!
//! `Store` implementation layered over any `KeyValueStore`.
//!
//! ## Key Layout
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `prop:` | name | raw bytes |
//! | `iter:` | created ‖ action ‖ node | `Iteration` |
//! | `out:` | utxo | output record |
//! | `outt:` | trace ‖ created ‖ utxo | - |
//! | `outa:` | sha3(group) ‖ asset ‖ state ‖ created ‖ utxo | - |
//! | `act:` | type ‖ id | `Action` |
//! | `actp:` | created ‖ type ‖ id | `UnifiedOutput` |
//! | `tx:` | trace | `Transaction` |
//! | `txh:` | hash | trace |
//! | `txs:` | state ‖ updated ‖ trace | - |
//! | `cout:` `coutt:` `coutk:` | as outputs, keyed by token | collectible |
//! | `ctx:` `ctxh:` `ctxs:` | as transactions | collectible |
//!
//! Timestamps are big-endian nanoseconds so prefix scans return rows
//! oldest first. Every mutation of a record and its indexes goes through
//! one `atomic_batch_write`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    encode_nanos, Action, ActionState, CollectibleOutput, CollectibleTransaction, Hash32,
    Iteration, Output, OutputState, OutputType, StoreError, Transaction, TransactionState,
    UnifiedOutput,
};
use crate::ports::outbound::{BatchOperation, KeyValueStore, Store};

const PROPERTY: &[u8] = b"prop:";
const ITERATION: &[u8] = b"iter:";
const ACTION: &[u8] = b"act:";
const ACTION_PENDING: &[u8] = b"actp:";

fn key(parts: &[&[u8]]) -> Vec<u8> {
    let mut k = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for p in parts {
        k.extend_from_slice(p);
    }
    k
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corruption {
        message: e.to_string(),
    })
}

fn trailing_uuid(k: &[u8]) -> Result<Uuid, StoreError> {
    if k.len() < 16 {
        return Err(StoreError::Corruption {
            message: format!("index key too short: {} bytes", k.len()),
        });
    }
    Uuid::from_slice(&k[k.len() - 16..]).map_err(|e| StoreError::Corruption {
        message: e.to_string(),
    })
}

fn take_limit<T>(iter: impl Iterator<Item = T>, limit: usize) -> Vec<T> {
    if limit == 0 {
        iter.collect()
    } else {
        iter.take(limit).collect()
    }
}

// =============================================================================
// RECORD KINDS
// =============================================================================

/// Output kinds sharing the record and index layout.
trait OutputKind: Serialize + DeserializeOwned + Clone {
    const RECORD: &'static [u8];
    const BY_TRACE: &'static [u8];
    const BY_CLASS: &'static [u8];

    fn id(&self) -> Uuid;
    fn state(&self) -> OutputState;
    fn created_at(&self) -> DateTime<Utc>;
    /// Secondary index prefix preceding the state byte.
    fn class(&self) -> Vec<u8>;
}

impl OutputKind for Output {
    const RECORD: &'static [u8] = b"out:";
    const BY_TRACE: &'static [u8] = b"outt:";
    const BY_CLASS: &'static [u8] = b"outa:";

    fn id(&self) -> Uuid {
        self.utxo_id
    }
    fn state(&self) -> OutputState {
        self.state
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn class(&self) -> Vec<u8> {
        asset_class(&self.group_id, self.asset_id)
    }
}

impl OutputKind for CollectibleOutput {
    const RECORD: &'static [u8] = b"cout:";
    const BY_TRACE: &'static [u8] = b"coutt:";
    const BY_CLASS: &'static [u8] = b"coutk:";

    fn id(&self) -> Uuid {
        self.output_id
    }
    fn state(&self) -> OutputState {
        self.state
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn class(&self) -> Vec<u8> {
        self.token_id.as_bytes().to_vec()
    }
}

fn asset_class(group_id: &str, asset_id: Uuid) -> Vec<u8> {
    key(&[Hash32::digest(group_id).as_bytes(), asset_id.as_bytes()])
}

#[derive(Serialize, Deserialize)]
struct OutputRecord<T> {
    output: T,
    trace_id: Option<Uuid>,
}

impl<T: OutputKind> OutputRecord<T> {
    fn index_keys(&self) -> Vec<Vec<u8>> {
        let id = self.output.id();
        let created = encode_nanos(&self.output.created_at());
        let mut keys = vec![key(&[
            T::BY_CLASS,
            &self.output.class(),
            &[self.output.state().index()],
            &created,
            id.as_bytes(),
        ])];
        if let Some(trace) = self.trace_id {
            keys.push(key(&[T::BY_TRACE, trace.as_bytes(), &created, id.as_bytes()]));
        }
        keys
    }
}

/// Transaction kinds sharing the record and index layout.
trait TransactionKind: Serialize + DeserializeOwned + Clone {
    const RECORD: &'static [u8];
    const BY_HASH: &'static [u8];
    const BY_STATE: &'static [u8];

    fn trace_id(&self) -> Uuid;
    fn state(&self) -> TransactionState;
    fn hash(&self) -> Option<Hash32>;
    fn updated_at(&self) -> DateTime<Utc>;

    fn state_key(&self) -> Vec<u8> {
        key(&[
            Self::BY_STATE,
            &[self.state().index()],
            &encode_nanos(&self.updated_at()),
            self.trace_id().as_bytes(),
        ])
    }
}

impl TransactionKind for Transaction {
    const RECORD: &'static [u8] = b"tx:";
    const BY_HASH: &'static [u8] = b"txh:";
    const BY_STATE: &'static [u8] = b"txs:";

    fn trace_id(&self) -> Uuid {
        self.trace_id
    }
    fn state(&self) -> TransactionState {
        self.state
    }
    fn hash(&self) -> Option<Hash32> {
        self.hash
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl TransactionKind for CollectibleTransaction {
    const RECORD: &'static [u8] = b"ctx:";
    const BY_HASH: &'static [u8] = b"ctxh:";
    const BY_STATE: &'static [u8] = b"ctxs:";

    fn trace_id(&self) -> Uuid {
        self.trace_id
    }
    fn state(&self) -> TransactionState {
        self.state
    }
    fn hash(&self) -> Option<Hash32> {
        self.hash
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// =============================================================================
// STORE
// =============================================================================

/// `Store` over a key-value backend.
pub struct KvGroupStore<K> {
    kv: RwLock<K>,
}

impl<K: KeyValueStore> KvGroupStore<K> {
    /// Wrap a key-value backend.
    pub fn new(kv: K) -> Self {
        Self {
            kv: RwLock::new(kv),
        }
    }

    /// Release the backend.
    pub fn into_inner(self) -> K {
        self.kv.into_inner()
    }

    fn read_output<T: OutputKind>(
        kv: &K,
        id: Uuid,
    ) -> Result<Option<OutputRecord<T>>, StoreError> {
        kv.get(&key(&[T::RECORD, id.as_bytes()]))?
            .map(|b| decode(&b))
            .transpose()
    }

    /// Stage an output upsert. Returns false when the write would regress state.
    fn stage_output<T: OutputKind>(
        kv: &K,
        out: &T,
        trace_id: Option<Uuid>,
        ops: &mut Vec<BatchOperation>,
    ) -> Result<bool, StoreError> {
        let old: Option<OutputRecord<T>> = Self::read_output(kv, out.id())?;
        let mut trace = trace_id;
        if let Some(old) = &old {
            if out.state() < old.output.state() {
                debug!(
                    "[mtg] ignoring output {} regression {:?} -> {:?}",
                    out.id(),
                    old.output.state(),
                    out.state()
                );
                return Ok(false);
            }
            trace = trace.or(old.trace_id);
            for k in old.index_keys() {
                ops.push(BatchOperation::delete(k));
            }
        }
        let record = OutputRecord {
            output: out.clone(),
            trace_id: trace,
        };
        for k in record.index_keys() {
            ops.push(BatchOperation::put(k, Vec::new()));
        }
        ops.push(BatchOperation::put(
            key(&[T::RECORD, out.id().as_bytes()]),
            encode(&record)?,
        ));
        Ok(true)
    }

    fn write_output_batch<T: OutputKind>(
        &self,
        outs: &[T],
        trace_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut kv = self.kv.write();
        let mut ops = Vec::new();
        for out in outs {
            Self::stage_output(&*kv, out, trace_id, &mut ops)?;
        }
        if ops.is_empty() {
            return Ok(());
        }
        kv.atomic_batch_write(ops)
    }

    fn scan_outputs<T: OutputKind>(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<T>, StoreError> {
        let kv = self.kv.read();
        let mut outs = Vec::new();
        for (k, _) in kv.prefix_scan(prefix)? {
            if limit > 0 && outs.len() >= limit {
                break;
            }
            let id = trailing_uuid(&k)?;
            let record: OutputRecord<T> =
                Self::read_output(&*kv, id)?.ok_or_else(|| StoreError::Corruption {
                    message: format!("dangling output index {}", id),
                })?;
            outs.push(record.output);
        }
        Ok(outs)
    }

    fn read_tx<T: TransactionKind>(kv: &K, trace_id: Uuid) -> Result<Option<T>, StoreError> {
        kv.get(&key(&[T::RECORD, trace_id.as_bytes()]))?
            .map(|b| decode(&b))
            .transpose()
    }

    fn stage_tx<T: TransactionKind>(
        tx: &T,
        old: Option<&T>,
        ops: &mut Vec<BatchOperation>,
    ) -> Result<(), StoreError> {
        if let Some(old) = old {
            ops.push(BatchOperation::delete(old.state_key()));
            if let Some(h) = old.hash() {
                ops.push(BatchOperation::delete(key(&[T::BY_HASH, h.as_bytes()])));
            }
        }
        ops.push(BatchOperation::put(tx.state_key(), Vec::new()));
        if let Some(h) = tx.hash() {
            ops.push(BatchOperation::put(
                key(&[T::BY_HASH, h.as_bytes()]),
                tx.trace_id().as_bytes().to_vec(),
            ));
        }
        ops.push(BatchOperation::put(
            key(&[T::RECORD, tx.trace_id().as_bytes()]),
            encode(tx)?,
        ));
        Ok(())
    }

    fn create_tx<T: TransactionKind>(&self, tx: &T) -> Result<bool, StoreError> {
        let mut kv = self.kv.write();
        if Self::read_tx::<T>(&*kv, tx.trace_id())?.is_some() {
            return Ok(false);
        }
        let mut ops = Vec::new();
        Self::stage_tx(tx, None, &mut ops)?;
        kv.atomic_batch_write(ops)?;
        Ok(true)
    }

    fn write_tx<T: TransactionKind>(&self, tx: &T) -> Result<(), StoreError> {
        let mut kv = self.kv.write();
        let old = Self::read_tx::<T>(&*kv, tx.trace_id())?;
        if let Some(old) = &old {
            if tx.state() < old.state() {
                debug!(
                    "[mtg] ignoring transaction {} regression {:?} -> {:?}",
                    tx.trace_id(),
                    old.state(),
                    tx.state()
                );
                return Ok(());
            }
        }
        let mut ops = Vec::new();
        Self::stage_tx(tx, old.as_ref(), &mut ops)?;
        kv.atomic_batch_write(ops)
    }

    fn read_tx_by_hash<T: TransactionKind>(&self, hash: &Hash32) -> Result<Option<T>, StoreError> {
        let kv = self.kv.read();
        let Some(trace) = kv.get(&key(&[T::BY_HASH, hash.as_bytes()]))? else {
            return Ok(None);
        };
        let trace = trailing_uuid(&trace)?;
        Self::read_tx(&*kv, trace)
    }

    fn list_tx<T: TransactionKind>(
        &self,
        state: TransactionState,
        limit: usize,
    ) -> Result<Vec<T>, StoreError> {
        let kv = self.kv.read();
        let scan = kv.prefix_scan(&key(&[T::BY_STATE, &[state.index()]]))?;
        let mut txs = Vec::new();
        for (k, _) in scan {
            if limit > 0 && txs.len() >= limit {
                break;
            }
            let trace = trailing_uuid(&k)?;
            let tx = Self::read_tx::<T>(&*kv, trace)?.ok_or_else(|| StoreError::Corruption {
                message: format!("dangling transaction index {}", trace),
            })?;
            txs.push(tx);
        }
        Ok(txs)
    }
}

fn type_byte(t: OutputType) -> u8 {
    match t {
        OutputType::Multisig => 0,
        OutputType::Collectible => 1,
    }
}

impl<K: KeyValueStore> Store for KvGroupStore<K> {
    fn read_property(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.kv.read().get(&key(&[PROPERTY, name.as_bytes()]))
    }

    fn write_property(&self, name: &str, value: &[u8]) -> Result<(), StoreError> {
        self.kv.write().put(&key(&[PROPERTY, name.as_bytes()]), value)
    }

    fn write_iteration(&self, ir: &Iteration) -> Result<(), StoreError> {
        let k = key(&[
            ITERATION,
            &encode_nanos(&ir.created_at),
            &[ir.action.index()],
            ir.node_id.as_bytes(),
        ]);
        self.kv.write().put(&k, &encode(ir)?)
    }

    fn list_iterations(&self) -> Result<Vec<Iteration>, StoreError> {
        self.kv
            .read()
            .prefix_scan(ITERATION)?
            .iter()
            .map(|(_, v)| decode(v))
            .collect()
    }

    fn write_output(&self, out: &Output, trace_id: Option<Uuid>) -> Result<(), StoreError> {
        self.write_output_batch(std::slice::from_ref(out), trace_id)
    }

    fn write_outputs(&self, outs: &[Output], trace_id: Option<Uuid>) -> Result<(), StoreError> {
        self.write_output_batch(outs, trace_id)
    }

    fn list_outputs_for_transaction(&self, trace_id: Uuid) -> Result<Vec<Output>, StoreError> {
        self.scan_outputs(&key(&[Output::BY_TRACE, trace_id.as_bytes()]), 0)
    }

    fn list_outputs_for_asset(
        &self,
        group_id: &str,
        asset_id: Uuid,
        state: OutputState,
        limit: usize,
    ) -> Result<Vec<Output>, StoreError> {
        let prefix = key(&[
            Output::BY_CLASS,
            &asset_class(group_id, asset_id),
            &[state.index()],
        ]);
        self.scan_outputs(&prefix, limit)
    }

    fn write_action(&self, out: &UnifiedOutput, state: ActionState) -> Result<(), StoreError> {
        let id = out.unique_id();
        let t = [type_byte(out.output_type)];
        let record_key = key(&[ACTION, &t, id.as_bytes()]);
        let pending_key = key(&[
            ACTION_PENDING,
            &encode_nanos(&out.created_at),
            &t,
            id.as_bytes(),
        ]);

        let mut kv = self.kv.write();
        let old: Option<Action> = kv.get(&record_key)?.map(|b| decode(&b)).transpose()?;
        match old.map(|a| a.state) {
            Some(ActionState::Done) => return Ok(()),
            Some(ActionState::Initial) if state == ActionState::Initial => return Ok(()),
            _ => {}
        }

        let action = Action {
            output_id: id,
            created_at: out.created_at,
            state,
        };
        let mut ops = vec![BatchOperation::put(record_key, encode(&action)?)];
        match state {
            ActionState::Initial => ops.push(BatchOperation::put(pending_key, encode(out)?)),
            ActionState::Done => ops.push(BatchOperation::delete(pending_key)),
        }
        kv.atomic_batch_write(ops)
    }

    fn list_actions(&self, limit: usize) -> Result<Vec<UnifiedOutput>, StoreError> {
        let scan = self.kv.read().prefix_scan(ACTION_PENDING)?;
        take_limit(scan.iter().map(|(_, v)| decode(v)), limit)
            .into_iter()
            .collect()
    }

    fn create_transaction(&self, tx: &Transaction) -> Result<bool, StoreError> {
        self.create_tx(tx)
    }

    fn write_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.write_tx(tx)
    }

    fn read_transaction(&self, trace_id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Self::read_tx(&*self.kv.read(), trace_id)
    }

    fn read_transaction_by_hash(&self, hash: &Hash32) -> Result<Option<Transaction>, StoreError> {
        self.read_tx_by_hash(hash)
    }

    fn list_transactions(
        &self,
        state: TransactionState,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.list_tx(state, limit)
    }

    fn delete_transaction(&self, trace_id: Uuid) -> Result<(), StoreError> {
        let mut kv = self.kv.write();
        let Some(old) = Self::read_tx::<Transaction>(&*kv, trace_id)? else {
            return Ok(());
        };
        let mut ops = vec![
            BatchOperation::delete(old.state_key()),
            BatchOperation::delete(key(&[Transaction::RECORD, trace_id.as_bytes()])),
        ];
        if let Some(h) = old.hash {
            ops.push(BatchOperation::delete(key(&[
                Transaction::BY_HASH,
                h.as_bytes(),
            ])));
        }
        kv.atomic_batch_write(ops)
    }

    fn write_collectible_output(
        &self,
        out: &CollectibleOutput,
        trace_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.write_output_batch(std::slice::from_ref(out), trace_id)
    }

    fn write_collectible_outputs(
        &self,
        outs: &[CollectibleOutput],
        trace_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.write_output_batch(outs, trace_id)
    }

    fn list_collectible_outputs_for_transaction(
        &self,
        trace_id: Uuid,
    ) -> Result<Vec<CollectibleOutput>, StoreError> {
        self.scan_outputs(&key(&[CollectibleOutput::BY_TRACE, trace_id.as_bytes()]), 0)
    }

    fn list_collectible_outputs_for_token(
        &self,
        token_id: Uuid,
        state: OutputState,
        limit: usize,
    ) -> Result<Vec<CollectibleOutput>, StoreError> {
        let prefix = key(&[
            CollectibleOutput::BY_CLASS,
            token_id.as_bytes(),
            &[state.index()],
        ]);
        self.scan_outputs(&prefix, limit)
    }

    fn create_collectible_transaction(
        &self,
        tx: &CollectibleTransaction,
    ) -> Result<bool, StoreError> {
        self.create_tx(tx)
    }

    fn write_collectible_transaction(
        &self,
        tx: &CollectibleTransaction,
    ) -> Result<(), StoreError> {
        self.write_tx(tx)
    }

    fn read_collectible_transaction(
        &self,
        trace_id: Uuid,
    ) -> Result<Option<CollectibleTransaction>, StoreError> {
        Self::read_tx(&*self.kv.read(), trace_id)
    }

    fn read_collectible_transaction_by_hash(
        &self,
        hash: &Hash32,
    ) -> Result<Option<CollectibleTransaction>, StoreError> {
        self.read_tx_by_hash(hash)
    }

    fn list_collectible_transactions(
        &self,
        state: TransactionState,
        limit: usize,
    ) -> Result<Vec<CollectibleTransaction>, StoreError> {
        self.list_tx(state, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::kv::InMemoryKVStore;
    use crate::domain::{Amount, IterationAction};
    use chrono::TimeZone;

    fn store() -> KvGroupStore<InMemoryKVStore> {
        KvGroupStore::new(InMemoryKVStore::new())
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn output(asset: Uuid, created: i64, state: OutputState) -> Output {
        Output {
            group_id: String::new(),
            user_id: Uuid::nil(),
            utxo_id: Uuid::new_v4(),
            asset_id: asset,
            transaction_hash: Hash32::digest(b"tx"),
            output_index: 0,
            sender: String::new(),
            amount: Amount::from_units(100),
            threshold: 1,
            members: vec![],
            memo: String::new(),
            state,
            created_at: ts(created),
            updated_at: ts(created),
            signed_by: String::new(),
            signed_tx: String::new(),
        }
    }

    fn transaction(trace: Uuid, state: TransactionState, updated: i64) -> Transaction {
        Transaction {
            group_id: String::new(),
            trace_id: trace,
            state,
            asset_id: Uuid::new_v4(),
            receivers: vec![Uuid::new_v4()],
            threshold: 1,
            amount: Amount::from_units(5),
            memo: String::new(),
            raw: vec![],
            hash: None,
            references: vec![],
            updated_at: ts(updated),
        }
    }

    #[test]
    fn test_property_roundtrip() {
        let s = store();
        assert_eq!(s.read_property("missing").unwrap(), None);
        s.write_property("k", b"v").unwrap();
        assert_eq!(s.read_property("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_outputs_for_asset_oldest_first() {
        let s = store();
        let asset = Uuid::new_v4();
        let late = output(asset, 20, OutputState::Unspent);
        let early = output(asset, 10, OutputState::Unspent);
        let signed = output(asset, 5, OutputState::Signed);
        s.write_outputs(&[late.clone(), early.clone(), signed], None)
            .unwrap();

        let listed = s
            .list_outputs_for_asset("", asset, OutputState::Unspent, 0)
            .unwrap();
        assert_eq!(listed, vec![early.clone(), late]);

        let limited = s
            .list_outputs_for_asset("", asset, OutputState::Unspent, 1)
            .unwrap();
        assert_eq!(limited, vec![early]);
    }

    #[test]
    fn test_outputs_partitioned_by_group() {
        let s = store();
        let asset = Uuid::new_v4();
        let mut out = output(asset, 1, OutputState::Unspent);
        out.group_id = "app".to_string();
        s.write_output(&out, None).unwrap();
        assert!(s
            .list_outputs_for_asset("", asset, OutputState::Unspent, 0)
            .unwrap()
            .is_empty());
        assert_eq!(
            s.list_outputs_for_asset("app", asset, OutputState::Unspent, 0)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_output_state_never_regresses() {
        let s = store();
        let asset = Uuid::new_v4();
        let mut out = output(asset, 1, OutputState::Spent);
        s.write_output(&out, None).unwrap();
        out.state = OutputState::Unspent;
        s.write_output(&out, None).unwrap();

        assert!(s
            .list_outputs_for_asset("", asset, OutputState::Unspent, 0)
            .unwrap()
            .is_empty());
        assert_eq!(
            s.list_outputs_for_asset("", asset, OutputState::Spent, 0)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_output_trace_kept_when_none() {
        let s = store();
        let trace = Uuid::new_v4();
        let mut out = output(Uuid::new_v4(), 1, OutputState::Signed);
        s.write_output(&out, Some(trace)).unwrap();
        out.state = OutputState::Spent;
        s.write_output(&out, None).unwrap();

        let listed = s.list_outputs_for_transaction(trace).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, OutputState::Spent);
    }

    #[test]
    fn test_output_reassigned_to_new_trace() {
        let s = store();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let out = output(Uuid::new_v4(), 1, OutputState::Signed);
        s.write_output(&out, Some(a)).unwrap();
        s.write_output(&out, Some(b)).unwrap();
        assert!(s.list_outputs_for_transaction(a).unwrap().is_empty());
        assert_eq!(s.list_outputs_for_transaction(b).unwrap().len(), 1);
    }

    #[test]
    fn test_create_transaction_is_insert_if_absent() {
        let s = store();
        let trace = Uuid::new_v4();
        let tx = transaction(trace, TransactionState::Initial, 1);
        assert!(s.create_transaction(&tx).unwrap());

        let mut other = tx.clone();
        other.memo = "second".to_string();
        assert!(!s.create_transaction(&other).unwrap());
        assert_eq!(s.read_transaction(trace).unwrap(), Some(tx));
    }

    #[test]
    fn test_transaction_state_index() {
        let s = store();
        let first = transaction(Uuid::new_v4(), TransactionState::Initial, 2);
        let second = transaction(Uuid::new_v4(), TransactionState::Initial, 1);
        s.write_transaction(&first).unwrap();
        s.write_transaction(&second).unwrap();

        let initial = s.list_transactions(TransactionState::Initial, 0).unwrap();
        assert_eq!(initial, vec![second.clone(), first.clone()]);

        let mut signed = first.clone();
        signed.state = TransactionState::Signed;
        signed.hash = Some(Hash32::digest(b"payload"));
        signed.updated_at = ts(3);
        s.write_transaction(&signed).unwrap();

        assert_eq!(
            s.list_transactions(TransactionState::Initial, 0).unwrap(),
            vec![second]
        );
        assert_eq!(
            s.list_transactions(TransactionState::Signed, 1).unwrap(),
            vec![signed.clone()]
        );
        assert_eq!(
            s.read_transaction_by_hash(&Hash32::digest(b"payload"))
                .unwrap(),
            Some(signed)
        );
    }

    #[test]
    fn test_transaction_state_never_regresses() {
        let s = store();
        let trace = Uuid::new_v4();
        s.write_transaction(&transaction(trace, TransactionState::Snapshot, 5))
            .unwrap();
        s.write_transaction(&transaction(trace, TransactionState::Signing, 6))
            .unwrap();
        assert_eq!(
            s.read_transaction(trace).unwrap().map(|t| t.state),
            Some(TransactionState::Snapshot)
        );
    }

    #[test]
    fn test_delete_transaction_clears_indexes() {
        let s = store();
        let mut tx = transaction(Uuid::new_v4(), TransactionState::Signed, 1);
        tx.hash = Some(Hash32::digest(b"h"));
        s.write_transaction(&tx).unwrap();
        s.delete_transaction(tx.trace_id).unwrap();

        assert_eq!(s.read_transaction(tx.trace_id).unwrap(), None);
        assert_eq!(
            s.read_transaction_by_hash(&Hash32::digest(b"h")).unwrap(),
            None
        );
        assert!(s
            .list_transactions(TransactionState::Signed, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_actions_never_reopen() {
        let s = store();
        let out = output(Uuid::new_v4(), 1, OutputState::Unspent).unified();
        s.write_action(&out, ActionState::Initial).unwrap();
        assert_eq!(s.list_actions(16).unwrap(), vec![out.clone()]);

        s.write_action(&out, ActionState::Done).unwrap();
        assert!(s.list_actions(16).unwrap().is_empty());

        s.write_action(&out, ActionState::Initial).unwrap();
        assert!(s.list_actions(16).unwrap().is_empty());
    }

    #[test]
    fn test_actions_ordered_by_created() {
        let s = store();
        let late = output(Uuid::new_v4(), 9, OutputState::Unspent).unified();
        let early = output(Uuid::new_v4(), 3, OutputState::Unspent).unified();
        s.write_action(&late, ActionState::Initial).unwrap();
        s.write_action(&early, ActionState::Initial).unwrap();
        assert_eq!(s.list_actions(0).unwrap(), vec![early.clone(), late]);
        assert_eq!(s.list_actions(1).unwrap(), vec![early]);
    }

    #[test]
    fn test_iterations_ordered_and_idempotent() {
        let s = store();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let second = Iteration {
            action: IterationAction::Remove,
            node_id: a,
            threshold: 1,
            created_at: ts(2),
        };
        let first = Iteration {
            action: IterationAction::Add,
            node_id: b,
            threshold: 1,
            created_at: ts(1),
        };
        s.write_iteration(&second).unwrap();
        s.write_iteration(&first).unwrap();
        s.write_iteration(&first).unwrap();
        assert_eq!(s.list_iterations().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_collectible_outputs_by_token() {
        let s = store();
        let token = Uuid::new_v4();
        let trace = Uuid::new_v4();
        let out = CollectibleOutput {
            user_id: Uuid::nil(),
            output_id: Uuid::new_v4(),
            token_id: token,
            transaction_hash: Hash32::digest(b"c"),
            output_index: 0,
            amount: Amount::from_units(100_000_000),
            senders_threshold: 1,
            senders: vec![],
            receivers_threshold: 1,
            receivers: vec![],
            memo: String::new(),
            state: OutputState::Unspent,
            created_at: ts(1),
            updated_at: ts(1),
            signed_by: String::new(),
            signed_tx: String::new(),
        };
        s.write_collectible_output(&out, None).unwrap();
        assert_eq!(
            s.list_collectible_outputs_for_token(token, OutputState::Unspent, 1)
                .unwrap(),
            vec![out.clone()]
        );

        let mut signed = out.clone();
        signed.state = OutputState::Signed;
        s.write_collectible_outputs(&[signed.clone()], Some(trace))
            .unwrap();
        assert!(s
            .list_collectible_outputs_for_token(token, OutputState::Unspent, 1)
            .unwrap()
            .is_empty());
        assert_eq!(
            s.list_collectible_outputs_for_transaction(trace).unwrap(),
            vec![signed]
        );
    }
}
