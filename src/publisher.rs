//! Binds transport + journal and centralises subject naming (§4.8).
//!
//! Composes `subject = "{env}.{feed}.{type}.{key}"` and publishes the
//! framed payload on the transport, additionally appending it to the
//! journal under the same subject as topic so archivers and downstream
//! readers can replay history the transport itself doesn't retain. The
//! Publisher is thin by design — it exists only to centralise subject
//! naming so other components can subscribe by well-known pattern.
//!
//! Wire encoding of any specific exchange feed is explicitly out of scope
//! (spec non-goal); `frame` below is a generic length-prefixed stand-in a
//! connector's own codec sits in front of.

use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::transport::Transport;
use std::sync::Arc;

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// The `key` segment identifies a specific instrument and follows exchange
/// ticker casing (`BTCUSD`, §3.1/§4.8's canonical examples), so unlike
/// `env`/`feed`/`message_type` it allows uppercase letters.
fn is_valid_key_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// A minimal length-prefixed frame: 4-byte little-endian length followed
/// by the raw bytes. Stands in for the repo's structured binary format
/// without committing this crate to any one exchange's schema.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(payload);
    framed
}

pub struct Publisher {
    transport: Arc<Transport>,
    journal: Arc<Journal>,
    env: String,
    feed: String,
}

impl Publisher {
    pub fn new(transport: Arc<Transport>, journal: Arc<Journal>, env: impl Into<String>, feed: impl Into<String>) -> Self {
        Publisher { transport, journal, env: env.into(), feed: feed.into() }
    }

    fn subject(&self, message_type: &str, key: &str) -> Result<String> {
        for segment in [self.env.as_str(), self.feed.as_str(), message_type] {
            if !is_valid_segment(segment) {
                return Err(Error::config(format!(
                    "invalid subject segment '{segment}': lowercase alphanumerics and dash only"
                )));
            }
        }
        if !is_valid_key_segment(key) {
            return Err(Error::config(format!(
                "invalid subject key '{key}': alphanumerics and dash only"
            )));
        }
        Ok(format!("{}.{}.{}.{}", self.env, self.feed, message_type, key))
    }

    /// Frames `payload`, publishes it on the transport, and appends it to
    /// the journal under the same subject.
    pub fn publish(&self, message_type: &str, key: &str, payload: &[u8]) -> Result<u64> {
        let subject = self.subject(message_type, key)?;
        let framed = frame(payload);
        self.journal.append(&subject, Some(key.as_bytes().to_vec()), framed.clone());
        self.transport.publish(&subject, framed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_publisher() -> Publisher {
        Publisher::new(Arc::new(Transport::new()), Arc::new(Journal::new()), "dev", "kalshi")
    }

    #[test]
    fn composes_expected_subject() {
        let publisher = new_publisher();
        let result = publisher.publish("trade", "BTCUSD", b"payload");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_invalid_segment() {
        let publisher = new_publisher();
        let result = publisher.publish("Trade!", "BTCUSD", b"payload");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn publish_reaches_subscriber_and_journal() {
        let transport = Arc::new(Transport::new());
        let journal = Arc::new(Journal::new());
        let publisher = Publisher::new(transport.clone(), journal.clone(), "dev", "kalshi");

        let mut sub = transport.subscribe("dev.kalshi.trade.BTCUSD");
        publisher.publish("trade", "BTCUSD", b"{}").unwrap();

        let envelope = sub.next().await.unwrap();
        assert_eq!(envelope.subject, "dev.kalshi.trade.BTCUSD");
        assert_eq!(journal.end_position("dev.kalshi.trade.BTCUSD"), 0);
    }
}
