//! Build request parameters.
//!
//! Requests arrive with string ids and decimal amounts as applications
//! send them; the group validates them before anything is written.

use super::identifiers::Hash32;

/// Parameters for a fungible transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferParams {
    /// Asset uuid.
    pub asset_id: String,
    /// Receiver uuids.
    pub receivers: Vec<String>,
    /// Signatures required from receivers.
    pub threshold: usize,
    /// Decimal amount, 8 places at most.
    pub amount: String,
    /// Application memo.
    pub memo: String,
    /// Caller-chosen trace uuid.
    pub trace_id: String,
    /// Application group id, may be empty.
    pub group_id: String,
    /// Referenced transaction hashes, two at most.
    pub references: Vec<Hash32>,
}

impl TransferParams {
    /// Transfer without references.
    pub fn new(
        asset_id: impl Into<String>,
        receivers: Vec<String>,
        threshold: usize,
        amount: impl Into<String>,
        memo: impl Into<String>,
        trace_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            receivers,
            threshold,
            amount: amount.into(),
            memo: memo.into(),
            trace_id: trace_id.into(),
            group_id: group_id.into(),
            references: Vec::new(),
        }
    }

    /// Attach references.
    pub fn with_references(mut self, references: Vec<Hash32>) -> Self {
        self.references = references;
        self
    }
}

/// Parameters for a collectible transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectibleTransferParams {
    /// Receiver uuids.
    pub receivers: Vec<String>,
    /// Signatures required from receivers.
    pub threshold: usize,
    /// Application memo.
    pub memo: String,
    /// Token uuid.
    pub token_id: String,
    /// Caller-chosen trace uuid.
    pub trace_id: String,
}
