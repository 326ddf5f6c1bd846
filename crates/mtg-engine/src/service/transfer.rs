//! # Fungible Transfers
//!
//! Build, sign and publish group spends.
//!
//! ## Signing
//!
//! ```text
//! candidates = outputs assigned to the trace
//!            | first 36 unspent outputs of (group, asset)
//! select until amount covered and group_size inputs taken
//!   ├─ short with a full batch → queue compaction, InsufficientFunds
//!   ├─ first candidate already aggregated for this trace → reuse it
//!   └─ ghost keys → versioned tx → multisig request → sign
//! ```
//!
//! Every member runs the same selection over the same feed, so the
//! transactions they sign are byte-identical.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::group::Group;
use crate::algorithms::{compaction_trace_id, select_outputs, total_amount};
use crate::codec::ExtraPack;
use crate::domain::{
    asset_hash, parse_non_nil, storage_price, unique_id, unix_epoch, Amount, Hash32, MtgError,
    NetworkError, Output, OutputState, RawTransactionError, Transaction, TransactionState,
    TransferParams, VersionedTransaction, COMPACTION_TRANSACTION_MEMO, MAX_REFERENCES,
    OUTPUTS_BATCH_SIZE, STORAGE_ASSET_ID, STORAGE_DATA_LIMIT, STORAGE_RECEIVER_ID,
    STORAGE_THRESHOLD, TX_VERSION_FUNGIBLE,
};
use crate::ports::outbound::GhostInput;

/// Validate receivers against a threshold and parse them.
pub(super) fn parse_receivers(
    receivers: &[String],
    threshold: usize,
) -> Result<Vec<Uuid>, MtgError> {
    if threshold < 1 || threshold > receivers.len() || threshold > u8::MAX as usize {
        return Err(MtgError::InvalidThreshold {
            threshold,
            receivers: receivers.len(),
        });
    }
    receivers
        .iter()
        .map(|r| parse_non_nil(r).ok_or_else(|| MtgError::InvalidReceiver(r.clone())))
        .collect()
}

pub(super) fn parse_id(kind: &'static str, value: &str) -> Result<Uuid, MtgError> {
    parse_non_nil(value).ok_or_else(|| MtgError::InvalidIdentifier {
        kind,
        value: value.to_string(),
    })
}

/// Broadcast raw bytes and report whether a snapshot includes them.
async fn snapshot(group: &Group, raw: &[u8]) -> Result<bool, MtgError> {
    let hash = group.network.send_raw_transaction(&hex::encode(raw)).await?;
    let info = group.network.get_raw_transaction(&hash).await?;
    Ok(info.and_then(|i| i.snapshot).is_some())
}

impl Group {
    pub(super) async fn build_transfer(&self, params: TransferParams) -> Result<Uuid, MtgError> {
        let receivers = parse_receivers(&params.receivers, params.threshold)?;
        let amount: Amount = params
            .amount
            .parse()
            .map_err(|_| MtgError::InvalidAmount(params.amount.clone()))?;
        if amount < Amount::MIN {
            return Err(MtgError::InvalidAmount(params.amount));
        }
        let asset_id = parse_id("asset", &params.asset_id)?;
        let trace_id = parse_id("trace", &params.trace_id)?;
        if params.references.len() > MAX_REFERENCES {
            return Err(MtgError::TooManyReferences(params.references.len()));
        }
        ExtraPack::new(trace_id, params.group_id.as_str(), params.memo.as_str())
            .encode()
            .map_err(|e| MtgError::InvalidMemo(e.to_string()))?;

        let tx = Transaction {
            group_id: params.group_id,
            trace_id,
            state: TransactionState::Initial,
            asset_id,
            receivers,
            threshold: params.threshold as u8,
            amount,
            memo: params.memo,
            raw: Vec::new(),
            hash: None,
            references: params.references,
            updated_at: self.clock.now().await,
        };
        let created = self.store.create_transaction(&tx)?;
        debug!(trace = %trace_id, created, "[mtg] transaction built");
        Ok(trace_id)
    }

    /// Pay for storing `data` on chain.
    ///
    /// The trace id derives from the data hash, so storing the same bytes
    /// twice returns the first transaction. The data travels as the memo
    /// and is not held to the general memo limit.
    pub(super) async fn build_storage(
        &self,
        data: &[u8],
        group_id: &str,
    ) -> Result<Transaction, MtgError> {
        let digest = Hash32::digest(data).to_hex();
        let trace_id = unique_id(&digest, &digest);
        if let Some(old) = self.store.read_transaction(trace_id)? {
            return Ok(old);
        }
        if data.len() > STORAGE_DATA_LIMIT {
            return Err(MtgError::InvalidMemo(format!(
                "storage data of {} bytes",
                data.len()
            )));
        }
        let memo = String::from_utf8(data.to_vec())
            .map_err(|e| MtgError::InvalidMemo(format!("storage data: {}", e)))?;

        let tx = Transaction {
            group_id: group_id.to_string(),
            trace_id,
            state: TransactionState::Initial,
            asset_id: STORAGE_ASSET_ID,
            receivers: vec![STORAGE_RECEIVER_ID],
            threshold: STORAGE_THRESHOLD,
            amount: storage_price(data.len()),
            memo,
            raw: Vec::new(),
            hash: None,
            references: Vec::new(),
            updated_at: self.clock.now().await,
        };
        if self.store.create_transaction(&tx)? {
            debug!(trace = %trace_id, size = data.len(), "[mtg] storage transaction built");
            return Ok(tx);
        }
        Ok(self.store.read_transaction(trace_id)?.unwrap_or(tx))
    }

    /// Self-transfer merging `amount` of an asset back to the members.
    ///
    /// Dated at the UNIX epoch so it sorts ahead of every other pending
    /// transaction.
    pub(super) fn compaction_transaction(
        &self,
        group_id: String,
        asset_id: Uuid,
        trace_id: Uuid,
        amount: Amount,
    ) -> Transaction {
        Transaction {
            group_id,
            trace_id,
            state: TransactionState::Initial,
            asset_id,
            receivers: self.members.clone(),
            threshold: self.threshold,
            amount,
            memo: COMPACTION_TRANSACTION_MEMO.to_string(),
            raw: Vec::new(),
            hash: None,
            references: Vec::new(),
            updated_at: unix_epoch(),
        }
    }

    fn build_compaction(&self, source: &Transaction, outputs: &[Output]) -> Result<(), MtgError> {
        if let Some(out) = outputs.iter().find(|o| o.group_id != source.group_id) {
            return Err(MtgError::Consistency(format!(
                "compaction of {} mixes group {} into {}",
                source.trace_id, out.group_id, source.group_id
            )));
        }
        let total = total_amount(outputs);
        let trace_id = compaction_trace_id(outputs);
        let tx = self.compaction_transaction(
            source.group_id.clone(),
            source.asset_id,
            trace_id,
            total,
        );
        let created = self.store.create_transaction(&tx)?;
        info!(
            group = %source.group_id,
            source = %source.trace_id,
            trace = %trace_id,
            total = %total,
            created,
            "[mtg] compaction built"
        );
        Ok(())
    }

    /// Initial transactions in signing order: those with outputs already
    /// assigned first, then the rest oldest first.
    fn signing_candidates(&self) -> Result<Vec<Transaction>, MtgError> {
        let pending = self.store.list_transactions(TransactionState::Initial, 0)?;
        let mut assigned = Vec::new();
        let mut rest = Vec::new();
        for tx in pending {
            if self.store.list_outputs_for_transaction(tx.trace_id)?.is_empty() {
                rest.push(tx);
            } else {
                assigned.push(tx);
            }
        }
        assigned.extend(rest);
        Ok(assigned)
    }

    /// Sign the first candidate that can be signed.
    ///
    /// Candidates that fail are skipped. When none signs, the first failure
    /// is returned; a fatal failure stops the walk.
    pub(super) async fn sign_transactions(&self) -> Result<(), MtgError> {
        let mut first_err = None;
        for tx in self.signing_candidates()? {
            let trace = tx.trace_id;
            match self.sign_candidate(tx).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(trace = %trace, "[mtg] skipping unsignable transaction: {}", e);
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn sign_candidate(&self, mut tx: Transaction) -> Result<(), MtgError> {
        let raw = self.sign_transaction(&tx).await?;
        let ver = VersionedTransaction::unmarshal(&raw)?;

        let pack = ExtraPack::decode_bytes(&ver.extra);
        match pack {
            Some(p) if p.trace_id == tx.trace_id && p.group_id == tx.group_id => {}
            other => {
                return Err(MtgError::Consistency(format!(
                    "signed {} carries pack {:?} for group {}",
                    tx.trace_id, other, tx.group_id
                )))
            }
        }

        tx.state = if ver.is_aggregated() {
            TransactionState::Signed
        } else {
            TransactionState::Signing
        };
        tx.hash = Some(ver.payload_hash());
        tx.raw = raw;
        tx.updated_at = self.clock.now().await;
        self.store.write_transaction(&tx)?;
        info!(
            trace = %tx.trace_id,
            hash = %ver.payload_hash(),
            state = ?tx.state,
            "[mtg] transaction signed"
        );
        Ok(())
    }

    async fn sign_transaction(&self, tx: &Transaction) -> Result<Vec<u8>, MtgError> {
        let mut outputs = self.store.list_outputs_for_transaction(tx.trace_id)?;
        if outputs.is_empty() {
            outputs = self.store.list_outputs_for_asset(
                &tx.group_id,
                tx.asset_id,
                OutputState::Unspent,
                OUTPUTS_BATCH_SIZE,
            )?;
        }
        if outputs.is_empty() {
            return Err(MtgError::NoOutputs(tx.trace_id));
        }
        if tx.is_compaction() && outputs.len() < OUTPUTS_BATCH_SIZE {
            return Err(MtgError::Compaction {
                trace_id: tx.trace_id,
                reason: format!("{} outputs", outputs.len()),
            });
        }

        if let Some(ver) = self.reuse_aggregated(tx, &outputs[0]) {
            debug!(trace = %tx.trace_id, "[mtg] reusing aggregated transaction");
            return Ok(ver.marshal()?);
        }

        let (ver, consumed) = self.build_raw_transaction(tx, &outputs).await?;
        if tx.is_compaction() && ver.outputs.len() != 1 {
            return Err(MtgError::Compaction {
                trace_id: tx.trace_id,
                reason: format!("{} outputs built", ver.outputs.len()),
            });
        }

        let request = self
            .network
            .create_multisig_request(&ver.to_hex()?)
            .await?;
        let request = self
            .network
            .sign_multisig_request(request.request_id, &self.pin)
            .await?;

        let signed_by = ver.payload_hash().to_hex();
        let marked: Vec<Output> = consumed
            .into_iter()
            .map(|mut out| {
                out.state = OutputState::Signed;
                out.signed_by = signed_by.clone();
                out.signed_tx = request.raw_transaction.clone();
                out
            })
            .collect();
        self.store.write_outputs(&marked, Some(tx.trace_id))?;

        hex::decode(&request.raw_transaction)
            .map_err(|e| RawTransactionError::Hex(e.to_string()).into())
    }

    /// The first candidate's spending transaction, when it is already
    /// aggregated for this trace.
    fn reuse_aggregated(&self, tx: &Transaction, first: &Output) -> Option<VersionedTransaction> {
        if first.signed_tx.is_empty() {
            return None;
        }
        let ver = VersionedTransaction::from_hex(&first.signed_tx).ok()?;
        let pack = ExtraPack::decode_bytes(&ver.extra)?;
        if ver.is_aggregated() && pack.trace_id == tx.trace_id && pack.group_id == tx.group_id {
            Some(ver)
        } else {
            None
        }
    }

    async fn build_raw_transaction(
        &self,
        tx: &Transaction,
        outputs: &[Output],
    ) -> Result<(VersionedTransaction, Vec<Output>), MtgError> {
        let selection = select_outputs(outputs, tx.amount, self.group_size);
        if !selection.covers(tx.amount) {
            if outputs.len() == OUTPUTS_BATCH_SIZE {
                self.build_compaction(tx, outputs)?;
            }
            warn!(
                trace = %tx.trace_id,
                available = %selection.total,
                required = %tx.amount,
                "[mtg] insufficient outputs"
            );
            return Err(MtgError::InsufficientFunds {
                available: selection.total,
                required: tx.amount,
                scanned: outputs.len(),
            });
        }
        let consumed = outputs[..selection.consumed].to_vec();

        let mut ver = VersionedTransaction::new(TX_VERSION_FUNGIBLE, asset_hash(&tx.asset_id));
        ver.extra = ExtraPack::new(tx.trace_id, tx.group_id.as_str(), tx.memo.as_str())
            .encode_unchecked()?
            .into_bytes();
        for out in &consumed {
            ver.add_input(out.transaction_hash, out.output_index);
        }

        let keys = self
            .network
            .read_ghost_keys(&[
                GhostInput {
                    receivers: tx.receivers.clone(),
                    index: 0,
                    hint: tx.trace_id,
                },
                GhostInput {
                    receivers: self.members.clone(),
                    index: 1,
                    hint: tx.trace_id,
                },
            ])
            .await?;
        let (payment, change) = match keys.as_slice() {
            [payment, change, ..] => (payment, change),
            _ => {
                return Err(NetworkError::Rejected(format!(
                    "{} ghost keys returned",
                    keys.len()
                ))
                .into())
            }
        };

        ver.outputs.push(payment.dump_output(tx.threshold, tx.amount));
        let rest = selection.change(tx.amount);
        if !rest.is_zero() {
            ver.outputs.push(change.dump_output(self.threshold, rest));
        }
        ver.references = tx.references.clone();
        Ok((ver, consumed))
    }

    pub(super) async fn publish_transactions(&self) -> Result<(), MtgError> {
        let signed = self.store.list_transactions(TransactionState::Signed, 0)?;
        for mut tx in signed {
            if !snapshot(self, &tx.raw).await? {
                continue;
            }
            tx.state = TransactionState::Snapshot;
            self.store.write_transaction(&tx)?;
            info!(trace = %tx.trace_id, hash = ?tx.hash, "[mtg] transaction snapshot");
        }
        Ok(())
    }

    pub(super) async fn publish_collectible_transactions(&self) -> Result<(), MtgError> {
        let signed = self
            .store
            .list_collectible_transactions(TransactionState::Signed, 0)?;
        for mut tx in signed {
            if !snapshot(self, &tx.raw).await? {
                continue;
            }
            tx.state = TransactionState::Snapshot;
            self.store.write_collectible_transaction(&tx)?;
            info!(trace = %tx.trace_id, hash = ?tx.hash, "[mtg] collectible snapshot");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::inbound::GroupApi;
    use crate::ports::outbound::OutputsOrder;
    use crate::service::testing::{harness, Harness};

    fn params(asset: Uuid, receivers: Vec<Uuid>, amount: &str, trace: Uuid) -> TransferParams {
        TransferParams::new(
            asset.to_string(),
            receivers.iter().map(Uuid::to_string).collect(),
            1,
            amount,
            "m",
            trace.to_string(),
            "",
        )
    }

    async fn drain(h: &Harness) {
        h.group.drain_outputs(OutputsOrder::Created).await.unwrap();
        h.group.drain_outputs(OutputsOrder::Updated).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_amount_rejected_without_row() {
        let h = harness(1).await;
        let trace = Uuid::new_v4();
        let err = h
            .group
            .build_transaction(params(Uuid::new_v4(), vec![Uuid::new_v4()], "0", trace))
            .await
            .unwrap_err();
        assert!(matches!(err, MtgError::InvalidAmount(_)));
        assert!(h.store.read_transaction(trace).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let h = harness(1).await;
        let asset = Uuid::new_v4();
        let receiver = Uuid::new_v4();

        let mut p = params(asset, vec![receiver], "1", Uuid::new_v4());
        p.threshold = 2;
        assert!(matches!(
            h.group.build_transaction(p).await,
            Err(MtgError::InvalidThreshold { .. })
        ));

        let mut p = params(asset, vec![receiver], "1", Uuid::new_v4());
        p.receivers.push(Uuid::nil().to_string());
        assert!(matches!(
            h.group.build_transaction(p).await,
            Err(MtgError::InvalidReceiver(_))
        ));

        let mut p = params(asset, vec![receiver], "1", Uuid::new_v4());
        p.asset_id = "bitcoin".to_string();
        assert!(matches!(
            h.group.build_transaction(p).await,
            Err(MtgError::InvalidIdentifier { kind: "asset", .. })
        ));

        let p = params(asset, vec![receiver], "1", Uuid::new_v4())
            .with_references(vec![Hash32::digest(b"a"), Hash32::digest(b"b"), Hash32::digest(b"c")]);
        assert!(matches!(
            h.group.build_transaction(p).await,
            Err(MtgError::TooManyReferences(3))
        ));

        let mut p = params(asset, vec![receiver], "1", Uuid::new_v4());
        p.memo = "x".repeat(300);
        assert!(matches!(
            h.group.build_transaction(p).await,
            Err(MtgError::InvalidMemo(_))
        ));

        let p = params(asset, vec![receiver], "0.000000001", Uuid::new_v4());
        assert!(matches!(
            h.group.build_transaction(p).await,
            Err(MtgError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_build_is_idempotent() {
        let h = harness(1).await;
        let trace = Uuid::new_v4();
        let p = params(Uuid::new_v4(), vec![Uuid::new_v4()], "0.00000001", trace);
        assert_eq!(h.group.build_transaction(p.clone()).await.unwrap(), trace);
        let first = h.store.read_transaction(trace).unwrap().unwrap();
        assert_eq!(h.group.build_transaction(p).await.unwrap(), trace);
        let second = h.store.read_transaction(trace).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            h.store
                .list_transactions(TransactionState::Initial, 0)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_two_outputs_with_change() {
        let h = harness(1).await;
        let asset = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        h.network.deposit(asset, "0.3".parse().unwrap(), "");
        h.network.deposit(asset, "0.3".parse().unwrap(), "");
        drain(&h).await;

        let trace = Uuid::new_v4();
        h.group
            .build_transaction(params(asset, vec![receiver], "0.5", trace))
            .await
            .unwrap();
        h.group.sign_transactions().await.unwrap();

        let tx = h.store.read_transaction(trace).unwrap().unwrap();
        assert_eq!(tx.state, TransactionState::Signed);
        let ver = VersionedTransaction::unmarshal(&tx.raw).unwrap();
        assert_eq!(ver.inputs.len(), 2);
        assert_eq!(ver.outputs.len(), 2);
        assert_eq!(ver.outputs[0].amount, "0.5".parse().unwrap());
        assert_eq!(ver.outputs[1].amount, "0.1".parse().unwrap());
        assert_eq!(ver.outputs[1].threshold, 1);
        let pack = ExtraPack::decode_bytes(&ver.extra).unwrap();
        assert_eq!(pack.trace_id, trace);
        assert_eq!(pack.memo, "m");

        let assigned = h.store.list_outputs_for_transaction(trace).unwrap();
        assert_eq!(assigned.len(), 2);
        assert!(assigned.iter().all(|o| o.state == OutputState::Signed));

        h.group.publish_transactions().await.unwrap();
        let tx = h.store.read_transaction(trace).unwrap().unwrap();
        assert_eq!(tx.state, TransactionState::Snapshot);
        let change = h.network.outputs_for(&[h.member]);
        assert!(change
            .iter()
            .any(|o| o.transaction_hash == ver.payload_hash() && o.amount == "0.1".parse().unwrap()));
        assert_eq!(h.network.outputs_for(&[receiver]).len(), 1);
    }

    #[tokio::test]
    async fn test_group_size_takes_more_inputs() {
        let h = harness(3).await;
        let asset = Uuid::new_v4();
        for _ in 0..4 {
            h.network.deposit(asset, "1".parse().unwrap(), "");
        }
        drain(&h).await;
        let trace = Uuid::new_v4();
        h.group
            .build_transaction(params(asset, vec![Uuid::new_v4()], "0.5", trace))
            .await
            .unwrap();
        h.group.sign_transactions().await.unwrap();
        let tx = h.store.read_transaction(trace).unwrap().unwrap();
        let ver = VersionedTransaction::unmarshal(&tx.raw).unwrap();
        assert_eq!(ver.inputs.len(), 3);
        assert_eq!(ver.outputs[1].amount, "2.5".parse().unwrap());
    }

    #[tokio::test]
    async fn test_no_outputs() {
        let h = harness(1).await;
        let trace = Uuid::new_v4();
        h.group
            .build_transaction(params(Uuid::new_v4(), vec![Uuid::new_v4()], "1", trace))
            .await
            .unwrap();
        let err = h.group.sign_transactions().await.unwrap_err();
        assert!(matches!(err, MtgError::NoOutputs(t) if t == trace));
        let tx = h.store.read_transaction(trace).unwrap().unwrap();
        assert_eq!(tx.state, TransactionState::Initial);
    }

    #[tokio::test]
    async fn test_storage_transaction() {
        let h = harness(1).await;
        h.network.deposit(STORAGE_ASSET_ID, "1".parse().unwrap(), "");
        drain(&h).await;

        let data = "a".repeat(1500);
        let tx = h
            .group
            .build_storage_transaction(data.as_bytes(), "")
            .await
            .unwrap();
        let digest = Hash32::digest(data.as_bytes()).to_hex();
        assert_eq!(tx.trace_id, unique_id(&digest, &digest));
        assert_eq!(tx.amount, "0.0002".parse().unwrap());
        assert_eq!(tx.receivers, vec![STORAGE_RECEIVER_ID]);
        assert_eq!(tx.threshold, STORAGE_THRESHOLD);
        assert_eq!(tx.memo, data);

        let again = h
            .group
            .build_storage_transaction(data.as_bytes(), "")
            .await
            .unwrap();
        assert_eq!(again, tx);

        h.group.sign_transactions().await.unwrap();
        let signed = h.store.read_transaction(tx.trace_id).unwrap().unwrap();
        assert_eq!(signed.state, TransactionState::Signed);
        let ver = VersionedTransaction::unmarshal(&signed.raw).unwrap();
        assert_eq!(ver.outputs[0].threshold, STORAGE_THRESHOLD);
        assert_eq!(ver.outputs[0].amount, "0.0002".parse().unwrap());
        let pack = ExtraPack::decode_bytes(&ver.extra).unwrap();
        assert_eq!(pack.memo, data);
    }

    #[tokio::test]
    async fn test_storage_data_rejected() {
        let h = harness(1).await;
        let big = vec![b'x'; STORAGE_DATA_LIMIT + 1];
        assert!(matches!(
            h.group.build_storage_transaction(&big, "").await,
            Err(MtgError::InvalidMemo(_))
        ));
        assert!(matches!(
            h.group.build_storage_transaction(&[0xff, 0xfe], "").await,
            Err(MtgError::InvalidMemo(_))
        ));
        assert!(h
            .store
            .list_transactions(TransactionState::Initial, 0)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unsignable_transaction_does_not_block_later_ones() {
        let h = harness(1).await;
        let funded = Uuid::new_v4();
        h.network.deposit(funded, "1".parse().unwrap(), "");
        drain(&h).await;

        let unfunded = Uuid::new_v4();
        h.group
            .build_transaction(params(Uuid::new_v4(), vec![Uuid::new_v4()], "1", unfunded))
            .await
            .unwrap();
        // an epoch-dated compaction that the input guard refuses
        let compaction = h.group.compaction_transaction(
            String::new(),
            funded,
            Uuid::new_v4(),
            "1".parse().unwrap(),
        );
        h.store.create_transaction(&compaction).unwrap();
        let paid = Uuid::new_v4();
        h.group
            .build_transaction(params(funded, vec![Uuid::new_v4()], "0.5", paid))
            .await
            .unwrap();

        h.group.sign_transactions().await.unwrap();

        let tx = h.store.read_transaction(paid).unwrap().unwrap();
        assert_eq!(tx.state, TransactionState::Signed);
        for trace in [unfunded, compaction.trace_id] {
            let tx = h.store.read_transaction(trace).unwrap().unwrap();
            assert_eq!(tx.state, TransactionState::Initial);
        }
    }

    #[tokio::test]
    async fn test_full_batch_shortfall_queues_compaction() {
        let h = harness(1).await;
        let asset = Uuid::new_v4();
        for _ in 0..40 {
            h.network.deposit(asset, "0.1".parse().unwrap(), "");
        }
        drain(&h).await;

        let trace = Uuid::new_v4();
        h.group
            .build_transaction(params(asset, vec![Uuid::new_v4()], "3.7", trace))
            .await
            .unwrap();
        let err = h.group.sign_transactions().await.unwrap_err();
        assert!(matches!(
            err,
            MtgError::InsufficientFunds { scanned: OUTPUTS_BATCH_SIZE, .. }
        ));

        let pending = h
            .store
            .list_transactions(TransactionState::Initial, 0)
            .unwrap();
        assert_eq!(pending.len(), 2);
        // dated at the epoch, so it is signed first
        let compaction = &pending[0];
        assert!(compaction.is_compaction());
        assert_eq!(compaction.amount, "3.6".parse().unwrap());
        assert_eq!(compaction.receivers, vec![h.member]);

        h.group.sign_transactions().await.unwrap();
        let compaction = h.store.read_transaction(compaction.trace_id).unwrap().unwrap();
        assert_eq!(compaction.state, TransactionState::Signed);
        let ver = VersionedTransaction::unmarshal(&compaction.raw).unwrap();
        assert_eq!(ver.inputs.len(), OUTPUTS_BATCH_SIZE);
        assert_eq!(ver.outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_short_compaction_refused() {
        let h = harness(1).await;
        let asset = Uuid::new_v4();
        h.network.deposit(asset, "1".parse().unwrap(), "");
        drain(&h).await;
        let tx = h.group.compaction_transaction(
            String::new(),
            asset,
            Uuid::new_v4(),
            "1".parse().unwrap(),
        );
        h.store.create_transaction(&tx).unwrap();
        let err = h.group.sign_transactions().await.unwrap_err();
        assert!(matches!(err, MtgError::Compaction { .. }));
    }

    #[tokio::test]
    async fn test_references_carried() {
        let h = harness(1).await;
        let asset = Uuid::new_v4();
        h.network.deposit(asset, "1".parse().unwrap(), "");
        drain(&h).await;
        let trace = Uuid::new_v4();
        let refs = vec![Hash32::digest(b"r1"), Hash32::digest(b"r2")];
        h.group
            .build_transaction(
                params(asset, vec![Uuid::new_v4()], "1", trace).with_references(refs.clone()),
            )
            .await
            .unwrap();
        h.group.sign_transactions().await.unwrap();
        let tx = h.store.read_transaction(trace).unwrap().unwrap();
        let ver = VersionedTransaction::unmarshal(&tx.raw).unwrap();
        assert_eq!(ver.references, refs);
        assert_eq!(ver.outputs.len(), 1);
    }
}
