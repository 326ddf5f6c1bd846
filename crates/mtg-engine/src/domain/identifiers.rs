//! # Identifiers
//!
//! Hashes and deterministic uuids shared by every member.
//!
//! All derivations here are pure functions of their inputs. Two members
//! computing the same spend always arrive at the same trace id, which is
//! what lets the store's insert-if-absent settle them on one row.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 32-byte SHA3-256 digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// All-zero hash.
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    /// SHA3-256 of `data`.
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data.as_ref());
        Hash32(hasher.finalize().into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl FromStr for Hash32 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Hash32(out))
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Hash32)
        }
    }
}

/// Deterministic uuid for an unordered pair of strings.
///
/// `unique_id(a, b) == unique_id(b, a)`.
pub fn unique_id(a: &str, b: &str) -> Uuid {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let digest = Hash32::digest(format!("{}{}", lo, hi));
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.0[..16]);
    Uuid::new_v8(bytes)
}

/// Hash identifying a member set, independent of member order.
pub fn hash_members(members: &[Uuid]) -> Hash32 {
    let mut ids: Vec<String> = members.iter().map(Uuid::to_string).collect();
    ids.sort();
    Hash32::digest(ids.concat())
}

/// Genesis id of a group: `sha3(sorted members ‖ ":" threshold ‖ ":" timestamp)`.
pub fn genesis_id(members: &[Uuid], threshold: u8, timestamp_nanos: u64) -> Hash32 {
    let mut ids: Vec<String> = members.iter().map(Uuid::to_string).collect();
    ids.sort();
    Hash32::digest(format!("{}:{}:{}", ids.concat(), threshold, timestamp_nanos))
}

/// On-chain asset hash of an asset uuid.
pub fn asset_hash(asset_id: &Uuid) -> Hash32 {
    Hash32::digest(asset_id.to_string())
}

/// Parse a non-nil uuid in canonical hyphenated form.
pub fn parse_non_nil(value: &str) -> Option<Uuid> {
    let id = Uuid::parse_str(value).ok()?;
    if id.is_nil() || id.hyphenated().to_string() != value.to_ascii_lowercase() {
        return None;
    }
    Some(id)
}
