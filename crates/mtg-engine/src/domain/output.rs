//! # Outputs
//!
//! `UnifiedOutput` is the wire form served by the custodial network feed.
//! It refines into `Output` (fungible multisig utxo) or `CollectibleOutput`
//! (NFT) depending on its type. Both projections share a three-state
//! lifecycle that only moves forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Amount;
use super::identifiers::Hash32;

/// Wire type tag of a unified output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    /// Fungible threshold utxo.
    #[serde(rename = "multisig_utxo")]
    Multisig,
    /// Non-fungible output.
    #[serde(rename = "non_fungible_output")]
    Collectible,
}

/// Output lifecycle. Ordered: a stored state never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputState {
    /// Spendable.
    Unspent,
    /// Committed to a signed transaction.
    Signed,
    /// Consumed on chain.
    Spent,
}

impl OutputState {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputState::Unspent => "unspent",
            OutputState::Signed => "signed",
            OutputState::Spent => "spent",
        }
    }

    /// Index byte used in store keys.
    pub fn index(&self) -> u8 {
        *self as u8
    }
}

/// Output as served by the custodial network.
///
/// Fields after `state` are type specific; the ones that do not apply to
/// `output_type` hold their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedOutput {
    /// Wire type.
    #[serde(rename = "type")]
    pub output_type: OutputType,
    /// Owning user.
    pub user_id: Uuid,
    /// Hash of the transaction that created this output.
    pub transaction_hash: Hash32,
    /// Index within that transaction.
    pub output_index: u32,
    /// Amount.
    pub amount: Amount,
    /// Memo of the creating transaction.
    pub memo: String,
    /// First seen by the network.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// Payload hash of the transaction spending it, hex.
    pub signed_by: String,
    /// Raw transaction spending it, hex.
    pub signed_tx: String,
    /// Lifecycle state.
    pub state: OutputState,

    /// Collectible output id.
    #[serde(default)]
    pub output_id: Uuid,
    /// Collectible token id.
    #[serde(default)]
    pub token_id: Uuid,
    /// Collectible senders threshold.
    #[serde(default)]
    pub senders_threshold: u8,
    /// Collectible senders.
    #[serde(default)]
    pub senders: Vec<Uuid>,
    /// Collectible receivers threshold.
    #[serde(default)]
    pub receivers_threshold: u8,
    /// Collectible receivers.
    #[serde(default)]
    pub receivers: Vec<Uuid>,

    /// Multisig utxo id.
    #[serde(default)]
    pub utxo_id: Uuid,
    /// Multisig asset id.
    #[serde(default)]
    pub asset_id: Uuid,
    /// Multisig threshold.
    #[serde(default)]
    pub threshold: u8,
    /// Multisig members.
    #[serde(default)]
    pub members: Vec<Uuid>,
    /// Multisig sender.
    #[serde(default)]
    pub sender: String,
}

impl UnifiedOutput {
    /// Id unique within the output's type.
    pub fn unique_id(&self) -> Uuid {
        match self.output_type {
            OutputType::Multisig => self.utxo_id,
            OutputType::Collectible => self.output_id,
        }
    }

    /// Fungible projection, `None` for collectibles.
    pub fn as_multisig(&self) -> Option<Output> {
        if self.output_type != OutputType::Multisig {
            return None;
        }
        Some(Output {
            group_id: String::new(),
            user_id: self.user_id,
            utxo_id: self.utxo_id,
            asset_id: self.asset_id,
            transaction_hash: self.transaction_hash,
            output_index: self.output_index,
            sender: self.sender.clone(),
            amount: self.amount,
            threshold: self.threshold,
            members: self.members.clone(),
            memo: self.memo.clone(),
            state: self.state,
            created_at: self.created_at,
            updated_at: self.updated_at,
            signed_by: self.signed_by.clone(),
            signed_tx: self.signed_tx.clone(),
        })
    }

    /// Collectible projection, `None` for fungible outputs.
    pub fn as_collectible(&self) -> Option<CollectibleOutput> {
        if self.output_type != OutputType::Collectible {
            return None;
        }
        Some(CollectibleOutput {
            user_id: self.user_id,
            output_id: self.output_id,
            token_id: self.token_id,
            transaction_hash: self.transaction_hash,
            output_index: self.output_index,
            amount: self.amount,
            senders_threshold: self.senders_threshold,
            senders: self.senders.clone(),
            receivers_threshold: self.receivers_threshold,
            receivers: self.receivers.clone(),
            memo: self.memo.clone(),
            state: self.state,
            created_at: self.created_at,
            updated_at: self.updated_at,
            signed_by: self.signed_by.clone(),
            signed_tx: self.signed_tx.clone(),
        })
    }
}

/// Fungible output owned by the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Application group this output is accounted to. Local only.
    pub group_id: String,
    /// Owning user.
    pub user_id: Uuid,
    /// Utxo id.
    pub utxo_id: Uuid,
    /// Asset id.
    pub asset_id: Uuid,
    /// Creating transaction hash.
    pub transaction_hash: Hash32,
    /// Index within the creating transaction.
    pub output_index: u32,
    /// Sender of the creating transaction.
    pub sender: String,
    /// Amount.
    pub amount: Amount,
    /// Signing threshold of the members.
    pub threshold: u8,
    /// Members holding the output.
    pub members: Vec<Uuid>,
    /// Memo of the creating transaction.
    pub memo: String,
    /// Lifecycle state.
    pub state: OutputState,
    /// First seen.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// Payload hash of the spending transaction, hex.
    pub signed_by: String,
    /// Spending raw transaction, hex.
    pub signed_tx: String,
}

impl Output {
    /// Wire form.
    pub fn unified(&self) -> UnifiedOutput {
        UnifiedOutput {
            output_type: OutputType::Multisig,
            user_id: self.user_id,
            transaction_hash: self.transaction_hash,
            output_index: self.output_index,
            amount: self.amount,
            memo: self.memo.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            signed_by: self.signed_by.clone(),
            signed_tx: self.signed_tx.clone(),
            state: self.state,
            output_id: Uuid::nil(),
            token_id: Uuid::nil(),
            senders_threshold: 0,
            senders: Vec::new(),
            receivers_threshold: 0,
            receivers: Vec::new(),
            utxo_id: self.utxo_id,
            asset_id: self.asset_id,
            threshold: self.threshold,
            members: self.members.clone(),
            sender: self.sender.clone(),
        }
    }
}

/// Non-fungible output owned by the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectibleOutput {
    /// Owning user.
    pub user_id: Uuid,
    /// Output id.
    pub output_id: Uuid,
    /// Token id.
    pub token_id: Uuid,
    /// Creating transaction hash.
    pub transaction_hash: Hash32,
    /// Index within the creating transaction.
    pub output_index: u32,
    /// Amount, one unit for a token.
    pub amount: Amount,
    /// Senders threshold.
    pub senders_threshold: u8,
    /// Senders.
    pub senders: Vec<Uuid>,
    /// Receivers threshold.
    pub receivers_threshold: u8,
    /// Receivers.
    pub receivers: Vec<Uuid>,
    /// Memo.
    pub memo: String,
    /// Lifecycle state.
    pub state: OutputState,
    /// First seen.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// Payload hash of the spending transaction, hex.
    pub signed_by: String,
    /// Spending raw transaction, hex.
    pub signed_tx: String,
}

impl CollectibleOutput {
    /// Wire form.
    pub fn unified(&self) -> UnifiedOutput {
        UnifiedOutput {
            output_type: OutputType::Collectible,
            user_id: self.user_id,
            transaction_hash: self.transaction_hash,
            output_index: self.output_index,
            amount: self.amount,
            memo: self.memo.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            signed_by: self.signed_by.clone(),
            signed_tx: self.signed_tx.clone(),
            state: self.state,
            output_id: self.output_id,
            token_id: self.token_id,
            senders_threshold: self.senders_threshold,
            senders: self.senders.clone(),
            receivers_threshold: self.receivers_threshold,
            receivers: self.receivers.clone(),
            utxo_id: Uuid::nil(),
            asset_id: Uuid::nil(),
            threshold: 0,
            members: Vec::new(),
            sender: String::new(),
        }
    }
}
