//! # Domain Errors
//!
//! Error types for the MTG engine.
//!
//! `MtgError` is what the public API and the orchestrator return. The
//! layer-specific enums below convert into it with `?`.
//!
//! | Class | Variants | Handling |
//! |-------|----------|----------|
//! | Validation | `InvalidThreshold`, `InvalidAmount`, ... | rejected before any write |
//! | Insufficient | `InsufficientFunds`, `NoOutputs` | reported, retried next tick |
//! | Transient | `Store`, `Network` | logged, retried next tick |
//! | Fatal | `Consistency` | run loop returns, host must exit |

use thiserror::Error;
use uuid::Uuid;

use super::amount::Amount;
use crate::config::ConfigError;

/// Errors produced while parsing decimal amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Empty input.
    #[error("Empty amount")]
    Empty,

    /// Not a non-negative decimal number.
    #[error("Malformed amount: {0}")]
    Malformed(String),

    /// More than 8 significant decimal places.
    #[error("Amount exceeds 8 decimal places: {0}")]
    TooPrecise(String),

    /// Does not fit into 64 bits of 1e-8 units.
    #[error("Amount overflow: {0}")]
    Overflow(String),
}

/// Errors produced by the NFO memo envelope codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NfoError {
    /// Shorter than prefix + version.
    #[error("NFO length {0}")]
    TooShort(usize),

    /// Prefix is not `NFO`.
    #[error("NFO prefix {0}")]
    Prefix(String),

    /// Unsupported envelope version.
    #[error("NFO version {0}")]
    Version(u8),

    /// Hint byte is neither 0 nor 1.
    #[error("NFO hint {0}")]
    Hint(u8),

    /// Mint mask other than bit 0.
    #[error("Invalid mask {0:#x}")]
    Mask(u64),

    /// Chain id differs from the default chain.
    #[error("Invalid chain {0}")]
    Chain(Uuid),

    /// Class bytes differ from the default class.
    #[error("Invalid class {0}")]
    Class(String),

    /// Collection is not a 16 byte uuid.
    #[error("Invalid collection length {0}")]
    Collection(usize),

    /// Token bytes are not in canonical big-endian form.
    #[error("Invalid token format {0}")]
    Token(String),

    /// Input ended inside a field.
    #[error("Data short: wanted {wanted} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the field needs
        wanted: usize,
        /// Bytes left in the input
        remaining: usize,
    },

    /// Bytes left after the extra payload.
    #[error("Trailing bytes after NFO: {0}")]
    TrailingBytes(usize),

    /// A length-prefixed field exceeds 127 bytes.
    #[error("NFO field {field} too long: {len}")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
    },
}

/// Errors produced by the mixin-extra memo pack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtraError {
    /// Memo is not base64url without padding.
    #[error("Invalid base64 memo: {0}")]
    Base64(String),

    /// Payload is not a valid pack.
    #[error("Invalid memo pack: {0}")]
    Pack(String),

    /// Pack decoded but trace id is nil.
    #[error("Memo pack has nil trace id")]
    NilTraceId,

    /// Encoded memo reaches the general extra size limit.
    #[error("Memo too long: {len} >= {limit}")]
    TooLong {
        /// Encoded length
        len: usize,
        /// Exclusive limit
        limit: usize,
    },
}

/// Errors produced by the raw transaction codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawTransactionError {
    /// Hex decoding failed.
    #[error("Invalid raw transaction hex: {0}")]
    Hex(String),

    /// Serialization failed.
    #[error("Raw transaction encode failed: {0}")]
    Encode(String),

    /// Deserialization failed.
    #[error("Raw transaction decode failed: {0}")]
    Decode(String),
}

/// Persistence errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Underlying database I/O failed.
    #[error("Store I/O error: {message}")]
    Io {
        /// Error detail
        message: String,
    },

    /// A stored record could not be decoded.
    #[error("Store corruption: {message}")]
    Corruption {
        /// Error detail
        message: String,
    },

    /// A record could not be encoded.
    #[error("Store serialization error: {message}")]
    Serialization {
        /// Error detail
        message: String,
    },
}

/// Custodial network errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Network temporarily unreachable.
    #[error("Network unavailable: {0}")]
    Unavailable(String),

    /// Request rejected by the network.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Referenced request or transaction is unknown.
    #[error("Not found: {0}")]
    NotFound(String),

    /// PIN verification failed.
    #[error("Invalid PIN")]
    InvalidPin,
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum MtgError {
    /// Threshold outside `1..=receivers`.
    #[error("Invalid receivers threshold {threshold}/{receivers}")]
    InvalidThreshold {
        /// Requested threshold
        threshold: usize,
        /// Number of receivers
        receivers: usize,
    },

    /// Amount unparsable or below one unit.
    #[error("Invalid amount {0}")]
    InvalidAmount(String),

    /// Receiver is not a non-nil uuid.
    #[error("Invalid receiver {0}")]
    InvalidReceiver(String),

    /// Asset, trace or token id malformed.
    #[error("Invalid {kind} id {value}")]
    InvalidIdentifier {
        /// Which identifier
        kind: &'static str,
        /// Offending value
        value: String,
    },

    /// Memo cannot be packed into an on-chain extra.
    #[error("Invalid memo: {0}")]
    InvalidMemo(String),

    /// More than two references.
    #[error("Too many references: {0}")]
    TooManyReferences(usize),

    /// NFO mint marker and token id disagree.
    #[error("Invalid nfo and token combination: {0}")]
    InvalidCombination(String),

    /// Not enough unspent outputs for the amount.
    #[error("Insufficient funds: {available} of {required} in {scanned} outputs")]
    InsufficientFunds {
        /// Sum of scanned outputs
        available: Amount,
        /// Requested amount
        required: Amount,
        /// Outputs scanned
        scanned: usize,
    },

    /// No candidate outputs for a transaction.
    #[error("Empty outputs for transaction {0}")]
    NoOutputs(Uuid),

    /// Compaction transaction cannot be signed as built.
    #[error("Invalid compaction transaction {trace_id}: {reason}")]
    Compaction {
        /// Compaction trace id
        trace_id: Uuid,
        /// Why it was refused
        reason: String,
    },

    /// On-chain data disagrees with local state. Fatal.
    #[error("Consistency violation: {0}")]
    Consistency(String),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Custodial network failure.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// NFO codec failure.
    #[error(transparent)]
    Nfo(#[from] NfoError),

    /// Memo pack failure.
    #[error(transparent)]
    Extra(#[from] ExtraError),

    /// Raw transaction codec failure.
    #[error(transparent)]
    RawTransaction(#[from] RawTransactionError),

    /// Unusable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MtgError {
    /// Whether the process must halt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MtgError::Consistency(_))
    }

    /// Whether the error was raised before any mutation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MtgError::InvalidThreshold { .. }
                | MtgError::InvalidAmount(_)
                | MtgError::InvalidReceiver(_)
                | MtgError::InvalidIdentifier { .. }
                | MtgError::InvalidMemo(_)
                | MtgError::TooManyReferences(_)
                | MtgError::InvalidCombination(_)
                | MtgError::Nfo(_)
                | MtgError::Config(_)
        )
    }
}
