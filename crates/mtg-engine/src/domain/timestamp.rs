//! Nanosecond timestamp helpers.
//!
//! Persisted times (clock, checkpoints, store keys) are big-endian `u64`
//! nanoseconds since the UNIX epoch.

use chrono::{DateTime, TimeZone, Utc};

/// The UNIX epoch.
pub fn unix_epoch() -> DateTime<Utc> {
    Utc.timestamp_nanos(0)
}

/// Nanoseconds since the epoch, clamped to `0..=u64::MAX`.
pub fn to_nanos(ts: &DateTime<Utc>) -> u64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX).max(0) as u64
}

/// Inverse of [`to_nanos`], saturating at `i64::MAX`.
pub fn from_nanos(nanos: u64) -> DateTime<Utc> {
    Utc.timestamp_nanos(i64::try_from(nanos).unwrap_or(i64::MAX))
}

/// Big-endian encoding used in properties and keys.
pub fn encode_nanos(ts: &DateTime<Utc>) -> [u8; 8] {
    to_nanos(ts).to_be_bytes()
}

/// Decode a big-endian timestamp, `None` unless exactly 8 bytes.
pub fn decode_nanos(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(from_nanos(u64::from_be_bytes(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nanos_roundtrip() {
        let ts = Utc.timestamp_nanos(1_640_995_200_123_456_789);
        assert_eq!(decode_nanos(&encode_nanos(&ts)), Some(ts));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(decode_nanos(&[1, 2, 3]).is_none());
        assert!(decode_nanos(&[]).is_none());
    }

    #[test]
    fn test_pre_epoch_clamps_to_zero() {
        let ts = Utc.timestamp_nanos(-5);
        assert_eq!(to_nanos(&ts), 0);
    }
}
