//! # Collectible Transfers
//!
//! Mints and transfers of non-fungible tokens. Same lifecycle as fungible
//! spends with the amount fixed at one token and the NFO envelope as the
//! transaction extra.
//!
//! | Kind | Trace id | Input |
//! |------|----------|-------|
//! | mint | `nfo_trace_id(nfo)` | one meta token output |
//! | transfer | caller supplied | one output of the token |

use tracing::{debug, info};
use uuid::Uuid;

use super::group::Group;
use super::transfer::{parse_id, parse_receivers};
use crate::codec::{nfo_trace_id, ExtraPack, NfoMemo, EXTRA_SIZE_GENERAL_LIMIT};
use crate::domain::{
    Amount, CollectibleOutput, CollectibleTransaction, CollectibleTransferParams, MtgError,
    NetworkError, OutputState, RawTransactionError, TransactionState, VersionedTransaction,
    COLLECTIBLE_META_TOKEN_ID, COLLECTIBLE_MIXIN_ASSET, TX_VERSION_COLLECTIBLE, UNITS_PER_WHOLE,
};
use crate::ports::outbound::GhostInput;

const ONE_TOKEN: Amount = Amount::from_units(UNITS_PER_WHOLE);

impl Group {
    pub(super) async fn build_collectible_mint(
        &self,
        receivers: &[String],
        threshold: usize,
        nfo: &[u8],
    ) -> Result<Uuid, MtgError> {
        let trace_id = nfo_trace_id(nfo);
        self.build_collectible(receivers, threshold, nfo.to_vec(), None, trace_id)
            .await
    }

    pub(super) async fn build_collectible_transfer(
        &self,
        params: CollectibleTransferParams,
    ) -> Result<Uuid, MtgError> {
        let token_id = parse_id("token", &params.token_id)?;
        let trace_id = parse_id("trace", &params.trace_id)?;
        let pack = ExtraPack::new(trace_id, "", params.memo.as_str())
            .encode()
            .map_err(|e| MtgError::InvalidMemo(e.to_string()))?;
        let nfo = NfoMemo::extra_only(pack.into_bytes()).encode()?;
        if nfo.len() > EXTRA_SIZE_GENERAL_LIMIT {
            return Err(MtgError::InvalidMemo(format!("nfo of {} bytes", nfo.len())));
        }
        self.build_collectible(
            &params.receivers,
            params.threshold,
            nfo,
            Some(token_id),
            trace_id,
        )
        .await
    }

    async fn build_collectible(
        &self,
        receivers: &[String],
        threshold: usize,
        nfo: Vec<u8>,
        token_id: Option<Uuid>,
        trace_id: Uuid,
    ) -> Result<Uuid, MtgError> {
        let receivers = parse_receivers(receivers, threshold)?;
        let memo = NfoMemo::decode(&nfo)?;
        if memo.will_mint() == token_id.is_some() {
            return Err(MtgError::InvalidCombination(format!(
                "{} with token {:?}",
                hex::encode(&nfo),
                token_id
            )));
        }

        let tx = CollectibleTransaction {
            trace_id,
            state: TransactionState::Initial,
            receivers,
            threshold: threshold as u8,
            amount: ONE_TOKEN,
            nfo,
            raw: Vec::new(),
            hash: None,
            updated_at: self.clock.now().await,
            token_id,
        };
        let created = self.store.create_collectible_transaction(&tx)?;
        debug!(trace = %trace_id, created, "[mtg] collectible transaction built");
        Ok(trace_id)
    }

    /// Sign the oldest Initial collectible that can be signed, skipping
    /// the ones that fail the same way as fungible signing does.
    pub(super) async fn sign_collectible_transactions(&self) -> Result<(), MtgError> {
        let mut first_err = None;
        for tx in self
            .store
            .list_collectible_transactions(TransactionState::Initial, 0)?
        {
            let trace = tx.trace_id;
            match self.sign_collectible_candidate(tx).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(trace = %trace, "[mtg] skipping unsignable collectible: {}", e);
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn sign_collectible_candidate(
        &self,
        mut tx: CollectibleTransaction,
    ) -> Result<(), MtgError> {
        let raw = self.sign_collectible_transaction(&tx).await?;
        let ver = VersionedTransaction::unmarshal(&raw)?;
        let nfo = NfoMemo::decode(&ver.extra).map_err(|e| {
            MtgError::Consistency(format!("signed collectible {} nfo: {}", tx.trace_id, e))
        })?;
        if nfo.will_mint() && nfo_trace_id(&ver.extra) != tx.trace_id {
            return Err(MtgError::Consistency(format!(
                "signed mint {} carries another nfo",
                tx.trace_id
            )));
        }

        tx.state = if ver.is_aggregated() {
            TransactionState::Signed
        } else {
            TransactionState::Signing
        };
        tx.hash = Some(ver.payload_hash());
        tx.raw = raw;
        tx.updated_at = self.clock.now().await;
        self.store.write_collectible_transaction(&tx)?;
        info!(
            trace = %tx.trace_id,
            hash = %ver.payload_hash(),
            state = ?tx.state,
            "[mtg] collectible signed"
        );
        Ok(())
    }

    async fn sign_collectible_transaction(
        &self,
        tx: &CollectibleTransaction,
    ) -> Result<Vec<u8>, MtgError> {
        let mut outputs = self
            .store
            .list_collectible_outputs_for_transaction(tx.trace_id)?;
        if outputs.is_empty() {
            let token = tx.token_id.unwrap_or(COLLECTIBLE_META_TOKEN_ID);
            outputs = self
                .store
                .list_collectible_outputs_for_token(token, OutputState::Unspent, 1)?;
        }
        let Some(first) = outputs.first() else {
            return Err(MtgError::NoOutputs(tx.trace_id));
        };

        let ver = match reusable(tx, first) {
            Some(old) if old.is_signed() => return Ok(old.marshal()?),
            Some(old) => old,
            None => self.build_raw_collectible(tx, &outputs).await?,
        };

        let request = self
            .network
            .create_collectible_request(&ver.to_hex()?)
            .await?;
        let request = self
            .network
            .sign_collectible_request(request.request_id, &self.pin)
            .await?;

        let signed_by = ver.payload_hash().to_hex();
        let marked: Vec<CollectibleOutput> = outputs
            .into_iter()
            .map(|mut out| {
                out.state = OutputState::Signed;
                out.signed_by = signed_by.clone();
                out.signed_tx = request.raw_transaction.clone();
                out
            })
            .collect();
        self.store
            .write_collectible_outputs(&marked, Some(tx.trace_id))?;

        hex::decode(&request.raw_transaction)
            .map_err(|e| RawTransactionError::Hex(e.to_string()).into())
    }

    async fn build_raw_collectible(
        &self,
        tx: &CollectibleTransaction,
        outputs: &[CollectibleOutput],
    ) -> Result<VersionedTransaction, MtgError> {
        let mut ver = VersionedTransaction::new(TX_VERSION_COLLECTIBLE, COLLECTIBLE_MIXIN_ASSET);
        ver.extra = tx.nfo.clone();
        let mut total = Amount::ZERO;
        for out in outputs {
            total = total.saturating_add(out.amount);
            ver.add_input(out.transaction_hash, out.output_index);
        }
        if total < tx.amount {
            return Err(MtgError::InsufficientFunds {
                available: total,
                required: tx.amount,
                scanned: outputs.len(),
            });
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
        let [payment, change, ..] = keys.as_slice() else {
            return Err(NetworkError::Rejected(format!("{} ghost keys returned", keys.len())).into());
        };
        ver.outputs.push(payment.dump_output(tx.threshold, tx.amount));
        if let Some(rest) = total.checked_sub(tx.amount).filter(|r| !r.is_zero()) {
            ver.outputs.push(change.dump_output(self.threshold, rest));
        }
        Ok(ver)
    }
}

/// The transaction already spending `first`, when it carries this NFO.
fn reusable(tx: &CollectibleTransaction, first: &CollectibleOutput) -> Option<VersionedTransaction> {
    if first.signed_tx.is_empty() {
        return None;
    }
    let ver = VersionedTransaction::from_hex(&first.signed_tx).ok()?;
    NfoMemo::decode(&ver.extra).ok()?;
    (ver.extra == tx.nfo).then_some(ver)
}
