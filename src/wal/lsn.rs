//! PostgreSQL LSN parsing and comparison (§4.10).
//!
//! `wal2json` LSNs are strings of the form `"HEX/HEX"`. Naive lexicographic
//! string comparison is a known sharp edge: `"0/9"` and `"0/10"` compare
//! "wrong" as strings. The correct comparison splits on `/`, parses both
//! sides as hex `u64`s, and compares the pair — this is the only
//! implementation guaranteed to satisfy "LSNs issued later by the server
//! compare strictly greater" for every width.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lsn {
    high: u64,
    low: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum LsnParseError {
    #[error("LSN '{0}' is missing the '/' separator")]
    MissingSeparator(String),
    #[error("LSN '{0}' has a non-hexadecimal component")]
    InvalidHex(String),
}

impl FromStr for Lsn {
    type Err = LsnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (high, low) = s
            .split_once('/')
            .ok_or_else(|| LsnParseError::MissingSeparator(s.to_string()))?;
        let high = u64::from_str_radix(high, 16).map_err(|_| LsnParseError::InvalidHex(s.to_string()))?;
        let low = u64::from_str_radix(low, 16).map_err(|_| LsnParseError::InvalidHex(s.to_string()))?;
        Ok(Lsn { high, low })
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.high, self.low)
    }
}

impl PartialOrd for Lsn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Lsn {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.high, self.low).cmp(&(other.high, other.low))
    }
}
