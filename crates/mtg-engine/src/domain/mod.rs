//! # Domain Layer
//!
//! Entities, value objects and errors of the MTG engine.

pub mod action;
pub mod amount;
pub mod errors;
pub mod identifiers;
pub mod iteration;
pub mod output;
pub mod params;
pub mod raw;
pub mod timestamp;
pub mod transaction;

pub use action::{Action, ActionState};
pub use amount::{Amount, AMOUNT_PRECISION, UNITS_PER_WHOLE};
pub use errors::{
    AmountError, ExtraError, MtgError, NetworkError, NfoError, RawTransactionError, StoreError,
};
pub use identifiers::{asset_hash, genesis_id, hash_members, parse_non_nil, unique_id, Hash32};
pub use iteration::{active_nodes, ActiveNodes, Iteration, IterationAction};
pub use output::{CollectibleOutput, Output, OutputState, OutputType, UnifiedOutput};
pub use params::{CollectibleTransferParams, TransferParams};
pub use raw::{
    Input, RawOutput, VersionedTransaction, TX_VERSION_COLLECTIBLE, TX_VERSION_FUNGIBLE,
};
pub use timestamp::{decode_nanos, encode_nanos, from_nanos, to_nanos, unix_epoch};
pub use transaction::{
    storage_price, CollectibleTransaction, Transaction, TransactionState,
    COLLECTIBLE_META_TOKEN_ID, COLLECTIBLE_MIXIN_ASSET, COMPACTION_TRANSACTION_MEMO,
    MAX_REFERENCES, OUTPUTS_BATCH_SIZE, STORAGE_ASSET_ID, STORAGE_DATA_LIMIT, STORAGE_PRICE_STEP,
    STORAGE_RECEIVER_ID, STORAGE_SIZE_STEP, STORAGE_THRESHOLD,
};
