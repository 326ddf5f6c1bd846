//! # Transactions
//!
//! Locally tracked spends, keyed by trace id.
//!
//! ## State Machine
//!
//! ```text
//! Initial ──sign──→ Signing ──aggregate──→ Signed ──broadcast──→ Snapshot
//!    └──────────sign (fully aggregated)──────↗
//! ```
//!
//! States only move right. The store enforces this on every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

use super::amount::Amount;
use super::identifiers::Hash32;

/// Memo marking a compaction self-transfer.
pub const COMPACTION_TRANSACTION_MEMO: &str = "COMPACTION";

/// Maximum inputs gathered for one spend.
pub const OUTPUTS_BATCH_SIZE: usize = 36;

/// Maximum references carried by one transaction.
pub const MAX_REFERENCES: usize = 2;

/// Asset paid for on-chain data storage.
pub const STORAGE_ASSET_ID: Uuid = uuid!("c94ac88f-4671-3976-b60a-09064f1811e8");

/// Sole receiver of storage payments.
pub const STORAGE_RECEIVER_ID: Uuid = uuid!("773e5e77-4107-45c2-b648-8fc722ed77f5");

/// Receiver threshold marking a storage payment.
pub const STORAGE_THRESHOLD: u8 = 64;

/// Bytes covered by one storage price step.
pub const STORAGE_SIZE_STEP: usize = 1024;

/// Price of one storage step, 0.0001.
pub const STORAGE_PRICE_STEP: Amount = Amount::from_units(10_000);

/// Largest data a storage transaction may carry.
pub const STORAGE_DATA_LIMIT: usize = 2 * 1024 * 1024;

/// Storage price of `len` bytes: one step per full kilobyte, plus one.
pub fn storage_price(len: usize) -> Amount {
    let steps = (len / STORAGE_SIZE_STEP + 1) as u64;
    Amount::from_units(STORAGE_PRICE_STEP.units() * steps)
}

/// Token spent when minting a new collectible.
pub const COLLECTIBLE_META_TOKEN_ID: Uuid = uuid!("2f8aa18a-3cb8-31d5-95bc-5a4f2e25dc2f");

/// On-chain asset of every collectible output.
pub const COLLECTIBLE_MIXIN_ASSET: Hash32 = Hash32([
    0x17, 0x00, 0x94, 0x12, 0x84, 0xa9, 0x5f, 0x31, 0xb2, 0x5e, 0xc8, 0xc5, 0x46, 0x00, 0x8f, 0x20,
    0x8f, 0x88, 0xee, 0xe4, 0x41, 0x9c, 0xcd, 0xcd, 0xbe, 0x6e, 0x31, 0x95, 0xe6, 0x01, 0x28, 0xca,
]);

/// Transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Built, not signed.
    Initial,
    /// Signed by this member, threshold not reached.
    Signing,
    /// Threshold signature aggregated.
    Signed,
    /// Confirmed in a network snapshot.
    Snapshot,
}

impl TransactionState {
    /// Index byte used in store keys.
    pub fn index(&self) -> u8 {
        *self as u8
    }
}

/// Fungible spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Application group the spend is accounted to.
    pub group_id: String,
    /// Deterministic trace id.
    pub trace_id: Uuid,
    /// Lifecycle state.
    pub state: TransactionState,
    /// Asset spent.
    pub asset_id: Uuid,
    /// Payment receivers.
    pub receivers: Vec<Uuid>,
    /// Payment threshold.
    pub threshold: u8,
    /// Payment amount.
    pub amount: Amount,
    /// Application memo.
    pub memo: String,
    /// Raw signed transaction, empty until signed.
    pub raw: Vec<u8>,
    /// Payload hash of `raw`.
    pub hash: Option<Hash32>,
    /// Referenced transaction hashes.
    pub references: Vec<Hash32>,
    /// Last local update, orders signing.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// True for compaction self-transfers.
    pub fn is_compaction(&self) -> bool {
        self.memo == COMPACTION_TRANSACTION_MEMO
    }
}

/// Non-fungible spend or mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectibleTransaction {
    /// Deterministic trace id.
    pub trace_id: Uuid,
    /// Lifecycle state.
    pub state: TransactionState,
    /// Receivers.
    pub receivers: Vec<Uuid>,
    /// Receivers threshold.
    pub threshold: u8,
    /// Always one whole unit.
    pub amount: Amount,
    /// NFO memo envelope carried as extra.
    pub nfo: Vec<u8>,
    /// Raw signed transaction.
    pub raw: Vec<u8>,
    /// Payload hash of `raw`.
    pub hash: Option<Hash32>,
    /// Last local update.
    pub updated_at: DateTime<Utc>,
    /// Token transferred, `None` when minting.
    pub token_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timestamp::unix_epoch;

    #[test]
    fn test_state_order_is_monotonic_path() {
        let path = [
            TransactionState::Initial,
            TransactionState::Signing,
            TransactionState::Signed,
            TransactionState::Snapshot,
        ];
        assert!(path.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(TransactionState::Snapshot.index(), 3);
    }

    #[test]
    fn test_storage_price_steps() {
        assert_eq!(storage_price(0), STORAGE_PRICE_STEP);
        assert_eq!(storage_price(1023), STORAGE_PRICE_STEP);
        assert_eq!(storage_price(1024), Amount::from_units(20_000));
        assert_eq!(storage_price(5000), "0.0005".parse().unwrap());
    }

    #[test]
    fn test_compaction_marker() {
        let tx = Transaction {
            group_id: String::new(),
            trace_id: Uuid::new_v4(),
            state: TransactionState::Initial,
            asset_id: Uuid::new_v4(),
            receivers: vec![],
            threshold: 1,
            amount: Amount::MIN,
            memo: COMPACTION_TRANSACTION_MEMO.to_string(),
            raw: vec![],
            hash: None,
            references: vec![],
            updated_at: unix_epoch(),
        };
        assert!(tx.is_compaction());
    }
}
