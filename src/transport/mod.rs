//! In-memory broadcast pub/sub keyed by subject string (§4.3, §4.4).
//!
//! Each publish stamps a monotonic sequence and a TSC timestamp and fans
//! out to all current subscribers of the exact subject — no wildcard
//! matching. The per-subject channel is lazily created on first `publish`
//! or `subscribe`, backed by a bounded broadcast buffer (1024 slots);
//! subscribers that fall behind lose intervening messages rather than
//! stalling the producer.
//!
//! Ordering guarantee: within one `Transport` instance, across all
//! subjects, sequences are strictly increasing in the order `publish`
//! returns. There is no cross-subject delivery-order guarantee.

mod envelope;
mod subscription;

pub use envelope::Envelope;
pub use subscription::Subscription;

use crate::clock::{SequenceCounter, TscClock};
use crate::error::Result;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

/// Per-subject broadcast buffer depth (spec §4.3, §4.4).
pub const SUBJECT_BUFFER: usize = 1024;

pub struct Transport {
    subjects: DashMap<String, broadcast::Sender<Envelope>>,
    sequence: SequenceCounter,
    clock: TscClock,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Transport {
            subjects: DashMap::new(),
            sequence: SequenceCounter::new(),
            clock: TscClock::new(),
        }
    }

    fn channel(&self, subject: &str) -> broadcast::Sender<Envelope> {
        if let Some(sender) = self.subjects.get(subject) {
            return sender.clone();
        }
        self.subjects
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(SUBJECT_BUFFER).0)
            .clone()
    }

    pub fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64> {
        self.publish_with_headers(subject, payload, HashMap::new())
    }

    pub fn publish_with_headers(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> Result<u64> {
        let sequence = self.sequence.next();
        let envelope = Envelope {
            subject: subject.to_string(),
            payload,
            headers,
            timestamp: self.clock.now_tsc(),
            sequence,
        };
        // A broadcast send fails only when there are zero receivers, which
        // is the normal "publish with no subscribers" case (§8.3) — not an
        // internal invariant violation, so it is not surfaced as an error.
        let _ = self.channel(subject).send(envelope);
        Ok(sequence)
    }

    pub fn subscribe(&self, subject: &str) -> Subscription {
        let receiver = self.channel(subject).subscribe();
        Subscription {
            subject: subject.to_string(),
            receiver,
        }
    }

    /// Always fails with `Timeout` in the in-memory transport — request/
    /// reply is a future concern (§4.3).
    pub async fn request(
        &self,
        _subject: &str,
        _payload: Vec<u8>,
        _timeout: Duration,
    ) -> Result<Envelope> {
        Err(crate::error::Error::TransportTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_is_strictly_increasing_per_instance() {
        let transport = Transport::new();
        let mut sub = transport.subscribe("test.seq");
        transport.publish("test.seq", b"1".to_vec()).unwrap();
        transport.publish("test.seq", b"2".to_vec()).unwrap();

        let first = sub.next().await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(first.payload, b"1");
        assert_eq!(second.payload, b"2");
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_succeeds() {
        let transport = Transport::new();
        let sequence = transport.publish("nobody.listens", b"x".to_vec()).unwrap();
        assert_eq!(sequence, 0);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_are_silent_to_producer() {
        let transport = Transport::new();
        let mut sub = transport.subscribe("test.overflow");
        for i in 0..(SUBJECT_BUFFER as u64 + 1) {
            transport
                .publish("test.overflow", i.to_string().into_bytes())
                .unwrap();
        }
        // The oldest message was dropped; `next()` transparently skips the
        // lag and returns what's still buffered rather than erroring.
        let first = sub.next().await.unwrap();
        assert!(first.sequence >= 1);
    }

    #[tokio::test]
    async fn request_always_times_out() {
        let transport = Transport::new();
        let result = transport
            .request("anything", vec![], Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(crate::error::Error::TransportTimeout)));
    }
}
