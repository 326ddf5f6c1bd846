//! # Raw Transactions
//!
//! The versioned transaction that members sign and broadcast.
//!
//! Encoding is `bincode` over the whole struct; the payload hash covers
//! everything except the signatures, so every member signing the same
//! spend signs the same hash.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::amount::Amount;
use super::errors::RawTransactionError;
use super::identifiers::Hash32;

/// Version of fungible transactions.
pub const TX_VERSION_FUNGIBLE: u8 = 4;

/// Version of collectible transactions.
pub const TX_VERSION_COLLECTIBLE: u8 = 2;

/// Reference to an output being spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Creating transaction hash.
    pub hash: Hash32,
    /// Output index.
    pub index: u32,
}

/// New output locked to one-time ghost keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    /// Amount.
    pub amount: Amount,
    /// One-time public keys of the receivers.
    pub keys: Vec<Hash32>,
    /// Ghost key mask.
    pub mask: Hash32,
    /// Signatures required to spend.
    pub threshold: u8,
}

/// Signable, broadcastable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedTransaction {
    /// Format version.
    pub version: u8,
    /// On-chain asset hash.
    pub asset: Hash32,
    /// Spent outputs.
    pub inputs: Vec<Input>,
    /// Created outputs.
    pub outputs: Vec<RawOutput>,
    /// Referenced transactions.
    pub references: Vec<Hash32>,
    /// Memo bytes.
    pub extra: Vec<u8>,
    /// Threshold signature once aggregated.
    pub aggregated_signature: Option<Vec<u8>>,
    /// Partial signatures by signer index.
    pub signatures: BTreeMap<u16, Vec<u8>>,
}

#[derive(Serialize)]
struct Payload<'a> {
    version: u8,
    asset: &'a Hash32,
    inputs: &'a [Input],
    outputs: &'a [RawOutput],
    references: &'a [Hash32],
    extra: &'a [u8],
}

impl VersionedTransaction {
    /// Empty unsigned transaction.
    pub fn new(version: u8, asset: Hash32) -> Self {
        Self {
            version,
            asset,
            inputs: Vec::new(),
            outputs: Vec::new(),
            references: Vec::new(),
            extra: Vec::new(),
            aggregated_signature: None,
            signatures: BTreeMap::new(),
        }
    }

    /// Append an input.
    pub fn add_input(&mut self, hash: Hash32, index: u32) {
        self.inputs.push(Input { hash, index });
    }

    /// Hash of everything but the signatures.
    pub fn payload_hash(&self) -> Hash32 {
        let payload = Payload {
            version: self.version,
            asset: &self.asset,
            inputs: &self.inputs,
            outputs: &self.outputs,
            references: &self.references,
            extra: &self.extra,
        };
        // Serializing borrowed plain data into a Vec cannot fail.
        let bytes = bincode::serialize(&payload).unwrap_or_default();
        Hash32::digest(bytes)
    }

    /// True once the threshold signature is aggregated.
    pub fn is_aggregated(&self) -> bool {
        self.aggregated_signature.is_some()
    }

    /// True when carrying any signature.
    pub fn is_signed(&self) -> bool {
        self.is_aggregated() || !self.signatures.is_empty()
    }

    /// Binary encoding.
    pub fn marshal(&self) -> Result<Vec<u8>, RawTransactionError> {
        bincode::serialize(self).map_err(|e| RawTransactionError::Encode(e.to_string()))
    }

    /// Decode binary encoding.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self, RawTransactionError> {
        bincode::deserialize(bytes).map_err(|e| RawTransactionError::Decode(e.to_string()))
    }

    /// Hex of the binary encoding.
    pub fn to_hex(&self) -> Result<String, RawTransactionError> {
        self.marshal().map(hex::encode)
    }

    /// Decode from hex.
    pub fn from_hex(s: &str) -> Result<Self, RawTransactionError> {
        let bytes = hex::decode(s).map_err(|e| RawTransactionError::Hex(e.to_string()))?;
        Self::unmarshal(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VersionedTransaction {
        let mut tx = VersionedTransaction::new(TX_VERSION_FUNGIBLE, Hash32::digest(b"asset"));
        tx.add_input(Hash32::digest(b"in"), 0);
        tx.outputs.push(RawOutput {
            amount: Amount::from_units(5),
            keys: vec![Hash32::digest(b"k")],
            mask: Hash32::digest(b"m"),
            threshold: 1,
        });
        tx.extra = b"memo".to_vec();
        tx
    }

    #[test]
    fn test_payload_hash_ignores_signatures() {
        let unsigned = sample();
        let mut signed = unsigned.clone();
        signed.signatures.insert(0, vec![1, 2, 3]);
        assert_eq!(unsigned.payload_hash(), signed.payload_hash());
        assert!(signed.is_signed());
        assert!(!signed.is_aggregated());
    }

    #[test]
    fn test_payload_hash_covers_extra() {
        let a = sample();
        let mut b = a.clone();
        b.extra = b"other".to_vec();
        assert_ne!(a.payload_hash(), b.payload_hash());
    }

    #[test]
    fn test_hex_roundtrip() {
        let mut tx = sample();
        tx.aggregated_signature = Some(vec![9; 64]);
        let decoded = VersionedTransaction::from_hex(&tx.to_hex().unwrap()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(matches!(
            VersionedTransaction::from_hex("zz"),
            Err(RawTransactionError::Hex(_))
        ));
        assert!(matches!(
            VersionedTransaction::from_hex("00"),
            Err(RawTransactionError::Decode(_))
        ));
    }
}
