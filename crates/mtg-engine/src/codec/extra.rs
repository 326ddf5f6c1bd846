//! # Mixin-Extra Pack
//!
//! Every transaction the group sends carries `{T, G, M}` as its memo:
//! trace id, group id and application memo. The pack is a MessagePack map
//! with keys in sorted order and empty strings omitted, then base64url
//! without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::domain::ExtraError;

/// Exclusive upper bound of an encoded memo.
pub const EXTRA_SIZE_GENERAL_LIMIT: usize = 256;

#[derive(Deserialize)]
struct WirePack {
    #[serde(rename = "G", default)]
    g: String,
    #[serde(rename = "M", default)]
    m: String,
    #[serde(rename = "T")]
    t: Uuid,
}

// Written as a map in key order G < M < T with empty strings left out.
impl Serialize for WirePack {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(!self.g.is_empty()) + usize::from(!self.m.is_empty());
        let mut map = serializer.serialize_map(Some(len))?;
        if !self.g.is_empty() {
            map.serialize_entry("G", &self.g)?;
        }
        if !self.m.is_empty() {
            map.serialize_entry("M", &self.m)?;
        }
        map.serialize_entry("T", &self.t)?;
        map.end()
    }
}

/// Decoded memo pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraPack {
    /// Trace id, never nil.
    pub trace_id: Uuid,
    /// Group id, may be empty.
    pub group_id: String,
    /// Application memo, may be empty.
    pub memo: String,
}

impl ExtraPack {
    /// New pack.
    pub fn new(trace_id: Uuid, group_id: impl Into<String>, memo: impl Into<String>) -> Self {
        Self {
            trace_id,
            group_id: group_id.into(),
            memo: memo.into(),
        }
    }

    /// Encode without the size check.
    pub fn encode_unchecked(&self) -> Result<String, ExtraError> {
        let wire = WirePack {
            g: self.group_id.clone(),
            m: self.memo.clone(),
            t: self.trace_id,
        };
        let bytes = rmp_serde::to_vec(&wire).map_err(|e| ExtraError::Pack(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Encode, rejecting memos at or above the general extra limit.
    pub fn encode(&self) -> Result<String, ExtraError> {
        if self.trace_id.is_nil() {
            return Err(ExtraError::NilTraceId);
        }
        let s = self.encode_unchecked()?;
        if s.len() >= EXTRA_SIZE_GENERAL_LIMIT {
            return Err(ExtraError::TooLong {
                len: s.len(),
                limit: EXTRA_SIZE_GENERAL_LIMIT,
            });
        }
        Ok(s)
    }

    /// Decode a memo string.
    pub fn decode(memo: &str) -> Result<Self, ExtraError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(memo)
            .map_err(|e| ExtraError::Base64(e.to_string()))?;
        let wire: WirePack =
            rmp_serde::from_slice(&bytes).map_err(|e| ExtraError::Pack(e.to_string()))?;
        if wire.t.is_nil() {
            return Err(ExtraError::NilTraceId);
        }
        Ok(Self {
            trace_id: wire.t,
            group_id: wire.g,
            memo: wire.m,
        })
    }

    /// Decode memo bytes, `None` when they are not a pack.
    pub fn decode_bytes(memo: &[u8]) -> Option<Self> {
        std::str::from_utf8(memo).ok().and_then(|s| Self::decode(s).ok())
    }
}
