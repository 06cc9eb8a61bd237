//! The hot-path message envelope (§3.1).

use std::collections::HashMap;

/// `{subject, payload, headers, timestamp, sequence}`.
///
/// Ephemeral: an envelope has no identity beyond `(subject, sequence)`.
/// `timestamp` is a TSC reading, not wall-clock, and is not portable across
/// hosts — see [`crate::clock`].
#[derive(Debug, Clone)]
pub struct Envelope {
    pub subject: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: u64,
    pub sequence: u64,
}
