//! # Amount
//!
//! Fixed-point asset amounts with 8 decimal places.
//!
//! The custodial network denominates every asset in 1e-8 units, so an
//! amount is a `u64` count of those units. Parsing is strict: no sign,
//! no exponent, at most 8 significant decimals.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use super::errors::AmountError;

/// Decimal places of every asset.
pub const AMOUNT_PRECISION: u32 = 8;

/// Units per whole asset.
pub const UNITS_PER_WHOLE: u64 = 100_000_000;

/// Non-negative amount in 1e-8 units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Smallest spendable amount, `0.00000001`.
    pub const MIN: Amount = Amount(1);

    /// From raw 1e-8 units.
    pub const fn from_units(units: u64) -> Self {
        Amount(units)
    }

    /// From a whole number of assets.
    pub fn from_whole(whole: u64) -> Option<Self> {
        whole.checked_mul(UNITS_PER_WHOLE).map(Amount)
    }

    /// Raw 1e-8 units.
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// True when zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Saturating addition.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits(whole) || !digits(frac) || (s.ends_with('.')) {
            return Err(AmountError::Malformed(s.to_string()));
        }

        // Zeros past the eighth decimal are accepted, anything else is not.
        let significant = frac.trim_end_matches('0');
        if significant.len() > AMOUNT_PRECISION as usize {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountError::Overflow(s.to_string());
        let whole: u64 = whole.parse().map_err(|_| overflow())?;
        let mut frac_units: u64 = 0;
        for (i, b) in significant.bytes().enumerate() {
            let digit = u64::from(b - b'0');
            frac_units += digit * 10u64.pow(AMOUNT_PRECISION - 1 - i as u32);
        }

        whole
            .checked_mul(UNITS_PER_WHOLE)
            .and_then(|w| w.checked_add(frac_units))
            .map(Amount)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_WHOLE;
        let frac = self.0 % UNITS_PER_WHOLE;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:08}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            u64::deserialize(deserializer).map(Amount)
        }
    }
}
