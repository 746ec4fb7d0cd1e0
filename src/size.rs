//! Byte counts for image and key files.
//!
//! Sizes can be given as a raw number of bytes (`4096`) or as a human
//! readable string (`"10 MB"`, `"1.5GiB"`). Decimal units are powers of
//! 1000, the `iB` units are powers of 1024.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CryptError, Result};

/// A non-negative number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSize", into = "u64")]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl From<ByteSize> for u64 {
    fn from(size: ByteSize) -> Self {
        size.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Multipliers by lowercase unit suffix.
const UNITS: &[(&str, u64)] = &[
    ("", 1),
    ("b", 1),
    ("byte", 1),
    ("bytes", 1),
    ("k", 1000),
    ("kb", 1000),
    ("m", 1000_u64.pow(2)),
    ("mb", 1000_u64.pow(2)),
    ("g", 1000_u64.pow(3)),
    ("gb", 1000_u64.pow(3)),
    ("t", 1000_u64.pow(4)),
    ("tb", 1000_u64.pow(4)),
    ("p", 1000_u64.pow(5)),
    ("pb", 1000_u64.pow(5)),
    ("kib", 1024),
    ("mib", 1024_u64.pow(2)),
    ("gib", 1024_u64.pow(3)),
    ("tib", 1024_u64.pow(4)),
    ("pib", 1024_u64.pow(5)),
];

impl FromStr for ByteSize {
    type Err = CryptError;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        if input.is_empty() {
            return Err(CryptError::invalid_size("empty size"));
        }

        if let Ok(bytes) = input.parse::<u64>() {
            return Ok(Self(bytes));
        }

        let split = input
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(input.len());
        let (number, unit) = input.split_at(split);
        let unit = unit.trim().to_ascii_lowercase();

        if number.is_empty() {
            return Err(CryptError::invalid_size(format!("{:?} has no numeric part", s)));
        }

        let multiplier = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, multiplier)| *multiplier)
            .ok_or_else(|| CryptError::invalid_size(format!("unknown unit in {:?}", s)))?;

        let value: f64 = number
            .parse()
            .map_err(|_| CryptError::invalid_size(format!("{:?} is not a number", s)))?;

        let bytes = value * multiplier as f64;
        if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
            return Err(CryptError::invalid_size(format!("{:?} is out of range", s)));
        }

        Ok(Self(bytes as u64))
    }
}

/// Accepted serialized forms: `2048` or `"2 KiB"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}

impl TryFrom<RawSize> for ByteSize {
    type Error = CryptError;

    fn try_from(raw: RawSize) -> Result<Self> {
        match raw {
            RawSize::Bytes(bytes) => Ok(Self(bytes)),
            RawSize::Text(text) => text.parse(),
        }
    }
}

/// Normalize a size string to a byte count.
pub fn coerce_size(value: &str) -> Result<u64> {
    value.parse::<ByteSize>().map(ByteSize::bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integers() {
        assert_eq!(coerce_size("0").unwrap(), 0);
        assert_eq!(coerce_size("2048").unwrap(), 2048);
        assert_eq!(coerce_size("  512 ").unwrap(), 512);
    }

    #[test]
    fn test_unitless_fraction_truncates() {
        assert_eq!(coerce_size("1.5").unwrap(), 1);
        assert_eq!(coerce_size("2047.9").unwrap(), 2047);
        assert_eq!(coerce_size(".5").unwrap(), 0);
    }

    #[test]
    fn test_decimal_units() {
        assert_eq!(coerce_size("1K").unwrap(), 1000);
        assert_eq!(coerce_size("10 MB").unwrap(), 10_000_000);
        assert_eq!(coerce_size("1.5 GB").unwrap(), 1_500_000_000);
        assert_eq!(coerce_size("42 bytes").unwrap(), 42);
    }

    #[test]
    fn test_binary_units() {
        assert_eq!(coerce_size("1 KiB").unwrap(), 1024);
        assert_eq!(coerce_size("2mib").unwrap(), 2 * 1024 * 1024);
        assert_eq!(coerce_size("1GiB").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_sizes() {
        for input in ["", "-5", ".", "abc", "10 parsecs", "1.2.3 MB", "-1 KB", "99999999999 PiB"] {
            let err = coerce_size(input).unwrap_err();
            assert!(
                matches!(err, CryptError::InvalidSize(_)),
                "{input:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_deserialize_number_or_string() {
        let size: ByteSize = serde_json::from_str("4096").unwrap();
        assert_eq!(size.bytes(), 4096);

        let size: ByteSize = serde_json::from_str("\"4 KiB\"").unwrap();
        assert_eq!(size.bytes(), 4096);

        assert!(serde_json::from_str::<ByteSize>("\"four\"").is_err());
        assert_eq!(serde_json::to_string(&ByteSize::new(7)).unwrap(), "7");
    }
}
