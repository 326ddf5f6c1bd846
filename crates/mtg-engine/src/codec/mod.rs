//! # Memo Codecs
//!
//! - `nfo`: binary envelope of collectible transactions
//! - `extra`: `{T, G, M}` pack carried in every group transaction memo

pub mod extra;
pub mod nfo;

pub use extra::{ExtraPack, EXTRA_SIZE_GENERAL_LIMIT};
pub use nfo::{
    nfo_trace_id, token_bytes_strip, NfoMemo, NFO_DEFAULT_CHAIN, NFO_DEFAULT_CLASS,
    NFO_MAX_FIELD_LEN, NFO_PREFIX, NFO_VERSION,
};
