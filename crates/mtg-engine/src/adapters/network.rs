//! # Simulated Custodial Network
//!
//! In-memory stand-in for the custodial network, shared by every member
//! of a test group. Each member talks to it through its own
//! [`SimulatedClient`], which carries the member's PIN.
//!
//! ## Behaviour
//!
//! - Ghost keys are derived from (hint, index, receiver), so every member
//!   assembles byte-identical transactions.
//! - Requests are keyed by payload hash. Each member's signature is added
//!   once; at `threshold` signatures the transaction is aggregated and the
//!   consumed outputs are marked signed in the feed.
//! - Broadcasting an aggregated transaction spends its inputs, creates its
//!   outputs and records a snapshot. Broadcasting twice is a no-op.
//! - `set_failing(true)` makes every call return `Unavailable`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::codec::NfoMemo;
use crate::domain::{
    hash_members, unique_id, Amount, Hash32, NetworkError, OutputState, OutputType,
    UnifiedOutput, VersionedTransaction, COLLECTIBLE_MIXIN_ASSET,
};
use crate::ports::outbound::{
    CustodialNetwork, GhostInput, GhostKeys, OutputsQuery, RawTransactionInfo, SignRequest,
};

struct Request {
    raw: VersionedTransaction,
    signers: BTreeSet<Uuid>,
}

struct Broadcast {
    raw: VersionedTransaction,
    snapshot: Hash32,
}

struct NetworkState {
    members: Vec<Uuid>,
    threshold: u8,
    pins: HashMap<Uuid, String>,
    outputs: Vec<UnifiedOutput>,
    ghosts: HashMap<Hash32, Vec<Uuid>>,
    assets: HashMap<Hash32, Uuid>,
    requests: HashMap<Uuid, Request>,
    broadcasts: HashMap<Hash32, Broadcast>,
    start: DateTime<Utc>,
    ticks: i64,
    failing: bool,
    list_calls: usize,
}

impl NetworkState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        self.start + Duration::milliseconds(self.ticks)
    }

    fn check_available(&self) -> Result<(), NetworkError> {
        if self.failing {
            return Err(NetworkError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn check_pin(&self, member: Uuid, pin: &str) -> Result<(), NetworkError> {
        match self.pins.get(&member) {
            Some(p) if p == pin && self.members.contains(&member) => Ok(()),
            _ => Err(NetworkError::InvalidPin),
        }
    }

    fn find_input(&mut self, hash: &Hash32, index: u32) -> Option<&mut UnifiedOutput> {
        self.outputs
            .iter_mut()
            .find(|o| &o.transaction_hash == hash && o.output_index == index)
    }

    fn sign(&mut self, request_id: Uuid, member: Uuid) -> Result<SignRequest, NetworkError> {
        let threshold = self.threshold as usize;
        let index = self
            .members
            .iter()
            .position(|m| *m == member)
            .ok_or(NetworkError::InvalidPin)? as u16;
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| NetworkError::NotFound(request_id.to_string()))?;

        let payload = request.raw.payload_hash();
        if !request.raw.is_aggregated() && request.signers.insert(member) {
            let sig = Hash32::digest(
                [payload.as_bytes().as_slice(), member.as_bytes().as_slice()].concat(),
            );
            request.raw.signatures.insert(index, sig.as_bytes().to_vec());
            if request.signers.len() >= threshold {
                let aggregated: Vec<u8> =
                    request.raw.signatures.values().flatten().copied().collect();
                request.raw.aggregated_signature = Some(Hash32::digest(aggregated).0.to_vec());
                request.raw.signatures.clear();
            }
        }

        let raw = request.raw.clone();
        let raw_hex = raw
            .to_hex()
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        if raw.is_aggregated() {
            let now = self.tick();
            for input in &raw.inputs {
                if let Some(out) = self.find_input(&input.hash, input.index) {
                    if out.state == OutputState::Unspent {
                        out.state = OutputState::Signed;
                        out.signed_by = payload.to_hex();
                        out.signed_tx = raw_hex.clone();
                        out.updated_at = now;
                    }
                }
            }
        }
        Ok(SignRequest {
            request_id,
            raw_transaction: raw_hex,
        })
    }

    fn create_request(&mut self, raw: &str) -> Result<SignRequest, NetworkError> {
        let tx = VersionedTransaction::from_hex(raw)
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        for input in &tx.inputs {
            if self.find_input(&input.hash, input.index).is_none() {
                return Err(NetworkError::Rejected(format!(
                    "unknown input {}:{}",
                    input.hash, input.index
                )));
            }
        }
        let payload = tx.payload_hash();
        let mut id = [0u8; 16];
        id.copy_from_slice(&payload.as_bytes()[..16]);
        let request_id = Uuid::from_bytes(id);
        let request = self.requests.entry(request_id).or_insert(Request {
            raw: tx,
            signers: BTreeSet::new(),
        });
        Ok(SignRequest {
            request_id,
            raw_transaction: request
                .raw
                .to_hex()
                .map_err(|e| NetworkError::Rejected(e.to_string()))?,
        })
    }

    fn broadcast(&mut self, raw: &str) -> Result<Hash32, NetworkError> {
        let tx = VersionedTransaction::from_hex(raw)
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        if !tx.is_aggregated() {
            return Err(NetworkError::Rejected("transaction not signed".to_string()));
        }
        let hash = tx.payload_hash();
        if self.broadcasts.contains_key(&hash) {
            return Ok(hash);
        }
        for input in &tx.inputs {
            match self.find_input(&input.hash, input.index) {
                Some(out) if out.state != OutputState::Spent || out.signed_by == hash.to_hex() => {}
                _ => {
                    return Err(NetworkError::Rejected(format!(
                        "input {}:{} unavailable",
                        input.hash, input.index
                    )))
                }
            }
        }

        let now = self.tick();
        let mut token_id = None;
        for input in &tx.inputs {
            if let Some(out) = self.find_input(&input.hash, input.index) {
                out.state = OutputState::Spent;
                out.signed_by = hash.to_hex();
                out.signed_tx = raw.to_string();
                out.updated_at = now;
                if out.output_type == OutputType::Collectible {
                    token_id = Some(out.token_id);
                }
            }
        }

        let collectible = tx.asset == COLLECTIBLE_MIXIN_ASSET;
        if collectible {
            if let Ok(nfo) = NfoMemo::decode(&tx.extra) {
                if nfo.will_mint() {
                    token_id = Some(unique_id(
                        &nfo.collection.to_string(),
                        &hex::encode(&nfo.token),
                    ));
                }
            }
        }
        let asset_id = self.assets.get(&tx.asset).copied().unwrap_or_default();
        for (index, raw_out) in tx.outputs.iter().enumerate() {
            let receivers = self.ghosts.get(&raw_out.mask).cloned().unwrap_or_default();
            let id = unique_id(&hash.to_hex(), &index.to_string());
            let mut out = blank_output(now);
            out.transaction_hash = hash;
            out.output_index = index as u32;
            out.amount = raw_out.amount;
            out.memo = String::from_utf8_lossy(&tx.extra).to_string();
            if collectible {
                out.output_type = OutputType::Collectible;
                out.output_id = id;
                out.token_id = token_id.unwrap_or_default();
                out.receivers = receivers;
                out.receivers_threshold = raw_out.threshold;
                out.memo = String::new();
            } else {
                out.utxo_id = id;
                out.asset_id = asset_id;
                out.members = receivers;
                out.threshold = raw_out.threshold;
            }
            self.outputs.push(out);
        }

        let snapshot =
            Hash32::digest([b"snapshot".as_slice(), hash.as_bytes().as_slice()].concat());
        self.broadcasts.insert(hash, Broadcast { raw: tx, snapshot });
        debug!("[mtg] simulated broadcast {} snapshot {}", hash, snapshot);
        Ok(hash)
    }
}

fn blank_output(now: DateTime<Utc>) -> UnifiedOutput {
    UnifiedOutput {
        output_type: OutputType::Multisig,
        user_id: Uuid::nil(),
        transaction_hash: Hash32::ZERO,
        output_index: 0,
        amount: Amount::ZERO,
        memo: String::new(),
        created_at: now,
        updated_at: now,
        signed_by: String::new(),
        signed_tx: String::new(),
        state: OutputState::Unspent,
        output_id: Uuid::nil(),
        token_id: Uuid::nil(),
        senders_threshold: 0,
        senders: Vec::new(),
        receivers_threshold: 0,
        receivers: Vec::new(),
        utxo_id: Uuid::nil(),
        asset_id: Uuid::nil(),
        threshold: 0,
        members: Vec::new(),
        sender: String::new(),
    }
}

/// Shared simulated network.
#[derive(Clone)]
pub struct SimulatedNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimulatedNetwork {
    /// Network custodying outputs for `members` at `threshold`. Feed
    /// timestamps start at `start` and advance one millisecond per event.
    pub fn new(members: Vec<Uuid>, threshold: u8, start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                members,
                threshold,
                pins: HashMap::new(),
                outputs: Vec::new(),
                ghosts: HashMap::new(),
                assets: HashMap::new(),
                requests: HashMap::new(),
                broadcasts: HashMap::new(),
                start,
                ticks: 0,
                failing: false,
                list_calls: 0,
            })),
        }
    }

    /// Client for one member.
    pub fn client(&self, member: Uuid, pin: impl Into<String>) -> SimulatedClient {
        self.state.lock().pins.insert(member, pin.into());
        SimulatedClient {
            state: self.state.clone(),
            member,
        }
    }

    /// Credit the group with a fresh multisig output.
    pub fn deposit(&self, asset_id: Uuid, amount: Amount, memo: &str) -> UnifiedOutput {
        let mut state = self.state.lock();
        let now = state.tick();
        let hash = Hash32::digest(format!("deposit:{}", state.ticks));
        state.assets.insert(crate::domain::asset_hash(&asset_id), asset_id);

        let mut out = blank_output(now);
        out.utxo_id = unique_id(&hash.to_hex(), "0");
        out.transaction_hash = hash;
        out.asset_id = asset_id;
        out.amount = amount;
        out.memo = memo.to_string();
        out.members = state.members.clone();
        out.threshold = state.threshold;
        out.sender = Uuid::nil().to_string();
        state.outputs.push(out.clone());
        out
    }

    /// Credit the group with a collectible token.
    pub fn deposit_collectible(&self, token_id: Uuid, memo: &str) -> UnifiedOutput {
        let mut state = self.state.lock();
        let now = state.tick();
        let hash = Hash32::digest(format!("collectible:{}", state.ticks));

        let mut out = blank_output(now);
        out.output_type = OutputType::Collectible;
        out.output_id = unique_id(&hash.to_hex(), "0");
        out.token_id = token_id;
        out.transaction_hash = hash;
        out.amount = Amount::from_units(crate::domain::UNITS_PER_WHOLE);
        out.memo = memo.to_string();
        out.receivers = state.members.clone();
        out.receivers_threshold = state.threshold;
        state.outputs.push(out.clone());
        out
    }

    /// Insert an arbitrary output into the feed.
    pub fn push_output(&self, out: UnifiedOutput) {
        self.state.lock().outputs.push(out);
    }

    /// Toggle injected failures.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Number of feed pages served.
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Every output in the feed, in insertion order.
    pub fn outputs(&self) -> Vec<UnifiedOutput> {
        self.state.lock().outputs.clone()
    }

    /// Outputs locked to exactly `receivers`.
    pub fn outputs_for(&self, receivers: &[Uuid]) -> Vec<UnifiedOutput> {
        let wanted = hash_members(receivers);
        self.state
            .lock()
            .outputs
            .iter()
            .filter(|o| match o.output_type {
                OutputType::Multisig => hash_members(&o.members) == wanted,
                OutputType::Collectible => hash_members(&o.receivers) == wanted,
            })
            .cloned()
            .collect()
    }

    /// Broadcast transaction by payload hash.
    pub fn transaction(&self, hash: &Hash32) -> Option<VersionedTransaction> {
        self.state.lock().broadcasts.get(hash).map(|b| b.raw.clone())
    }

    /// Number of broadcast transactions.
    pub fn broadcast_count(&self) -> usize {
        self.state.lock().broadcasts.len()
    }
}

/// One member's view of a [`SimulatedNetwork`].
pub struct SimulatedClient {
    state: Arc<Mutex<NetworkState>>,
    member: Uuid,
}

#[async_trait]
impl CustodialNetwork for SimulatedClient {
    async fn list_outputs(&self, query: &OutputsQuery) -> Result<Vec<UnifiedOutput>, NetworkError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.list_calls += 1;
        let mut page: Vec<UnifiedOutput> = state
            .outputs
            .iter()
            .filter(|o| match o.output_type {
                OutputType::Multisig => {
                    hash_members(&o.members) == query.members_hash && o.threshold == query.threshold
                }
                OutputType::Collectible => {
                    hash_members(&o.receivers) == query.members_hash
                        && o.receivers_threshold == query.threshold
                }
            })
            .filter(|o| query.order.timestamp_of(o) >= query.offset)
            .cloned()
            .collect();
        page.sort_by_key(|o| query.order.timestamp_of(o));
        page.truncate(query.limit);
        Ok(page)
    }

    async fn read_ghost_keys(&self, inputs: &[GhostInput]) -> Result<Vec<GhostKeys>, NetworkError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let mut all = Vec::with_capacity(inputs.len());
        for input in inputs {
            let seed = format!("{}:{}", input.hint, input.index);
            let mask = Hash32::digest(format!("mask:{}", seed));
            let keys = input
                .receivers
                .iter()
                .map(|r| Hash32::digest(format!("key:{}:{}", seed, r)))
                .collect();
            state.ghosts.insert(mask, input.receivers.clone());
            all.push(GhostKeys { mask, keys });
        }
        Ok(all)
    }

    async fn create_multisig_request(&self, raw: &str) -> Result<SignRequest, NetworkError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.create_request(raw)
    }

    async fn sign_multisig_request(
        &self,
        request_id: Uuid,
        pin: &str,
    ) -> Result<SignRequest, NetworkError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.check_pin(self.member, pin)?;
        state.sign(request_id, self.member)
    }

    async fn create_collectible_request(&self, raw: &str) -> Result<SignRequest, NetworkError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.create_request(raw)
    }

    async fn sign_collectible_request(
        &self,
        request_id: Uuid,
        pin: &str,
    ) -> Result<SignRequest, NetworkError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.check_pin(self.member, pin)?;
        state.sign(request_id, self.member)
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<Hash32, NetworkError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.broadcast(raw)
    }

    async fn get_raw_transaction(
        &self,
        hash: &Hash32,
    ) -> Result<Option<RawTransactionInfo>, NetworkError> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.broadcasts.get(hash).map(|b| RawTransactionInfo {
            hash: *hash,
            snapshot: Some(b.snapshot),
        }))
    }

    async fn verify_pin(&self, pin: &str) -> Result<(), NetworkError> {
        let state = self.state.lock();
        state.check_available()?;
        state.check_pin(self.member, pin)
    }
}
