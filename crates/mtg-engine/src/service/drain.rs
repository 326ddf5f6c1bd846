//! # Drain Pipeline
//!
//! Pulls the group's outputs from the custodial network in two orderings,
//! each with its own durable checkpoint, and projects every new
//! `(output, updated_at)` pair twice:
//!
//! 1. business: output rows, and transaction rows rebuilt from signed
//!    transactions observed on the feed
//! 2. action: an `Initial` action, unless the output was created by one
//!    of the group's own transactions
//!
//! A page shorter than half the batch ends the cycle.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::group::Group;
use crate::codec::{nfo_trace_id, ExtraPack, NfoMemo};
use crate::domain::{
    decode_nanos, encode_nanos, hash_members, to_nanos, ActionState, Amount, CollectibleOutput,
    CollectibleTransaction, MtgError, Output, OutputState, OutputType, Transaction,
    TransactionState, UnifiedOutput, VersionedTransaction, COMPACTION_TRANSACTION_MEMO,
    OUTPUTS_BATCH_SIZE,
};
use crate::ports::outbound::{OutputsOrder, OutputsQuery};

/// Property prefix of the per-ordering checkpoints.
pub const DRAIN_CHECKPOINT_KEY: &str = "outputs-draining-checkpoint";

fn checkpoint_key(order: OutputsOrder) -> String {
    format!("{}-by-{}", DRAIN_CHECKPOINT_KEY, order.as_str())
}

/// Decode a signed transaction and the memo pack in its extra.
fn decode_signed(signed_tx: &str) -> Result<(VersionedTransaction, ExtraPack), MtgError> {
    let ver = VersionedTransaction::from_hex(signed_tx)
        .map_err(|e| MtgError::Consistency(format!("undecodable signed tx: {}", e)))?;
    let pack = ExtraPack::decode_bytes(&ver.extra).ok_or_else(|| {
        MtgError::Consistency(format!("signed tx {} without memo pack", ver.payload_hash()))
    })?;
    Ok((ver, pack))
}

impl Group {
    pub(super) async fn drain_outputs(&self, order: OutputsOrder) -> Result<(), MtgError> {
        let key = checkpoint_key(order);
        let mut checkpoint = self.read_checkpoint(&key)?;
        let batch = self.settings.drain_batch.max(1);
        let members_hash = hash_members(&self.members);

        loop {
            let query = OutputsQuery {
                members_hash,
                threshold: self.threshold,
                offset: checkpoint,
                limit: batch,
                order,
            };
            let page = self.network.list_outputs(&query).await?;
            debug!(
                order = order.as_str(),
                offset = %checkpoint,
                count = page.len(),
                "[mtg] drained page"
            );
            let Some(last) = page.last() else {
                break;
            };
            let next = order.timestamp_of(last).max(checkpoint);

            self.process_page(&page)?;

            let progressed = next > checkpoint;
            if progressed {
                self.store.write_property(&key, &encode_nanos(&next))?;
                checkpoint = next;
            }
            if page.len() < batch / 2 {
                break;
            }
            if !progressed {
                warn!(
                    order = order.as_str(),
                    checkpoint = %checkpoint,
                    "[mtg] drain page did not advance the checkpoint"
                );
                break;
            }
        }
        Ok(())
    }

    fn read_checkpoint(&self, key: &str) -> Result<DateTime<Utc>, MtgError> {
        Ok(self
            .store
            .read_property(key)?
            .and_then(|b| decode_nanos(&b))
            .unwrap_or(self.epoch))
    }

    fn process_page(&self, page: &[UnifiedOutput]) -> Result<(), MtgError> {
        for out in page {
            let key = format!("OUT:{}:{}", out.unique_id(), to_nanos(&out.updated_at));
            if self.seen(&key) || out.updated_at < self.epoch {
                continue;
            }
            match out.output_type {
                OutputType::Multisig => {
                    if let Some(utxo) = out.as_multisig() {
                        self.process_multisig_output(utxo)?;
                    }
                }
                OutputType::Collectible => {
                    if let Some(cout) = out.as_collectible() {
                        self.process_collectible_output(cout)?;
                    }
                }
            }
            self.remember(key);
        }

        for out in page {
            let key = format!("ACT:{}:{}", out.unique_id(), to_nanos(&out.updated_at));
            if self.seen(&key) || out.updated_at < self.epoch {
                continue;
            }
            if !self.has_own_transaction(out)? {
                self.store.write_action(out, ActionState::Initial)?;
            }
            self.remember(key);
        }
        Ok(())
    }

    /// Whether `out` was created by a transaction the group tracks.
    fn has_own_transaction(&self, out: &UnifiedOutput) -> Result<bool, MtgError> {
        let hash = &out.transaction_hash;
        Ok(match out.output_type {
            OutputType::Multisig => self.store.read_transaction_by_hash(hash)?.is_some(),
            OutputType::Collectible => self
                .store
                .read_collectible_transaction_by_hash(hash)?
                .is_some(),
        })
    }

    fn process_multisig_output(&self, mut utxo: Output) -> Result<(), MtgError> {
        self.assign_group_id(&mut utxo);
        if utxo.signed_tx.is_empty() {
            self.store.write_output(&utxo, None)?;
            return Ok(());
        }

        let (ver, pack) = decode_signed(&utxo.signed_tx)?;
        if self.is_peer_compaction(&ver, &pack) {
            self.adopt_compaction(&utxo, &ver, &pack)?;
        }
        if utxo.state == OutputState::Unspent || !ver.is_signed() {
            self.store.write_output(&utxo, Some(pack.trace_id))?;
            return Ok(());
        }

        utxo.state = OutputState::Spent;
        self.store.write_output(&utxo, Some(pack.trace_id))?;

        let raw = ver.marshal()?;
        let hash = ver.payload_hash();
        match self.store.read_transaction(pack.trace_id)? {
            Some(mut old) => {
                let stale_raw = old.state == TransactionState::Signed
                    && ver.is_aggregated()
                    && old.raw != raw;
                if old.state < TransactionState::Signed || stale_raw {
                    old.state = TransactionState::Signed;
                    old.raw = raw;
                    old.hash = Some(hash);
                    self.store.write_transaction(&old)?;
                    debug!(trace = %pack.trace_id, hash = %hash, "[mtg] transaction signed by peers");
                }
            }
            None => {
                let first = ver.outputs.first();
                let tx = Transaction {
                    group_id: pack.group_id.clone(),
                    trace_id: pack.trace_id,
                    state: TransactionState::Signed,
                    asset_id: utxo.asset_id,
                    receivers: Vec::new(),
                    threshold: first.map(|o| o.threshold).unwrap_or(0),
                    amount: first.map(|o| o.amount).unwrap_or(Amount::ZERO),
                    memo: pack.memo.clone(),
                    raw,
                    hash: Some(hash),
                    references: ver.references.clone(),
                    updated_at: utxo.updated_at,
                };
                if self.store.create_transaction(&tx)? {
                    info!(trace = %tx.trace_id, hash = %hash, "[mtg] transaction rebuilt from feed");
                }
            }
        }
        Ok(())
    }

    /// An unsigned compaction request another member opened for the group.
    fn is_peer_compaction(&self, ver: &VersionedTransaction, pack: &ExtraPack) -> bool {
        !ver.is_aggregated()
            && pack.memo == COMPACTION_TRANSACTION_MEMO
            && ver.inputs.len() == OUTPUTS_BATCH_SIZE
            && ver.outputs.len() == 1
            && ver.outputs[0].keys.len() == self.members.len()
            && ver.outputs[0].threshold == self.threshold
    }

    fn adopt_compaction(
        &self,
        utxo: &Output,
        ver: &VersionedTransaction,
        pack: &ExtraPack,
    ) -> Result<(), MtgError> {
        let amount = ver.outputs[0].amount;
        let tx = self.compaction_transaction(
            pack.group_id.clone(),
            utxo.asset_id,
            pack.trace_id,
            amount,
        );
        let created = self.store.create_transaction(&tx)?;
        info!(
            group = %pack.group_id,
            trace = %pack.trace_id,
            amount = %amount,
            created,
            "[mtg] peer compaction adopted"
        );
        Ok(())
    }

    fn process_collectible_output(
        &self,
        mut out: CollectibleOutput,
    ) -> Result<(), MtgError> {
        if out.state == OutputState::Unspent || out.signed_tx.is_empty() {
            self.store.write_collectible_output(&out, None)?;
            return Ok(());
        }

        let ver = VersionedTransaction::from_hex(&out.signed_tx)
            .map_err(|e| MtgError::Consistency(format!("undecodable collectible tx: {}", e)))?;
        let nfo = NfoMemo::decode(&ver.extra).map_err(|e| {
            MtgError::Consistency(format!("collectible tx {} nfo: {}", ver.payload_hash(), e))
        })?;
        let trace_id = match ExtraPack::decode_bytes(&nfo.extra) {
            Some(pack) => pack.trace_id,
            None if nfo.will_mint() => nfo_trace_id(&ver.extra),
            None => {
                return Err(MtgError::Consistency(format!(
                    "collectible tx {} without trace",
                    ver.payload_hash()
                )))
            }
        };

        let mut state = TransactionState::Initial;
        if ver.is_signed() {
            out.state = OutputState::Spent;
            state = TransactionState::Signed;
        }
        let first = ver.outputs.first();
        let tx = CollectibleTransaction {
            trace_id,
            state,
            receivers: Vec::new(),
            threshold: first.map(|o| o.threshold).unwrap_or(0),
            amount: first.map(|o| o.amount).unwrap_or(Amount::ZERO),
            nfo: ver.extra.clone(),
            raw: ver.marshal()?,
            hash: Some(ver.payload_hash()),
            updated_at: out.updated_at,
            token_id: if nfo.will_mint() {
                None
            } else {
                Some(out.token_id)
            },
        };
        self.store.write_collectible_output(&out, Some(trace_id))?;

        match self.store.read_collectible_transaction(trace_id)? {
            Some(old) if old.state >= TransactionState::Signed => {}
            Some(mut old) => {
                old.state = old.state.max(state);
                old.raw = tx.raw;
                old.hash = tx.hash;
                self.store.write_collectible_transaction(&old)?;
            }
            None => {
                self.store.create_collectible_transaction(&tx)?;
            }
        }
        Ok(())
    }
}
