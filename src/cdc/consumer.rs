//! Durable pull consumer applying CDC events to the secmaster cache (§4.13).
//!
//! At-least-once delivery, idempotent application: SET and DEL are
//! inherently safe to repeat. Events older than the snapshot LSN are
//! acknowledged and dropped without touching the cache — the warmer
//! already captured that state. Decode failures are acknowledged (poison
//! messages must not wedge the consumer); cache failures are NOT
//! acknowledged so JetStream redelivers them.

use crate::cache::Cache;
use crate::cdc::event::{CdcEvent, Op};
use crate::error::{Error, Result};
use crate::wal::Lsn;
use async_nats::jetstream::{self, consumer::pull::Config as PullConfig, consumer::AckPolicy};
use futures_util::StreamExt;
use tracing::{error, info, instrument, warn};

/// Progress is logged at this cadence, matching the WAL reader's poll-loop
/// convention.
const PROGRESS_LOG_INTERVAL: u64 = 100;

pub struct CdcConsumer {
    consumer: jetstream::consumer::PullConsumer,
    snapshot_lsn: Lsn,
}

impl CdcConsumer {
    pub async fn new(nats_url: &str, stream_name: &str, consumer_name: &str, snapshot_lsn: &str) -> Result<Self> {
        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| Error::transport_connection(format!("failed to connect to NATS at {nats_url}: {e}")))?;
        let jetstream = jetstream::new(client);
        let stream = jetstream
            .get_stream(stream_name)
            .await
            .map_err(|e| Error::replication(format!("CDC stream {stream_name} not found: {e}")))?;
        let consumer = stream
            .get_or_create_consumer(
                consumer_name,
                PullConfig {
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject: "cdc.>".to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::replication(format!("failed to create consumer {consumer_name}: {e}")))?;

        let snapshot_lsn = snapshot_lsn
            .parse()
            .map_err(|e| Error::config(format!("invalid snapshot LSN '{snapshot_lsn}': {e}")))?;

        Ok(CdcConsumer { consumer, snapshot_lsn })
    }

    #[instrument(skip(self, cache))]
    pub async fn run(&self, cache: &dyn Cache) -> Result<()> {
        let mut messages = self
            .consumer
            .messages()
            .await
            .map_err(|e| Error::transport_subscribe(format!("failed to open CDC message stream: {e}")))?;

        let mut processed: u64 = 0;
        while let Some(delivery) = messages.next().await {
            let message = match delivery {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "error pulling CDC message, will be retried by JetStream");
                    continue;
                }
            };

            match apply_one(&message.payload, self.snapshot_lsn, cache).await {
                Applied::Processed => {
                    if let Err(e) = message.ack().await {
                        warn!(error = %e, "failed to ack CDC message");
                    }
                    processed += 1;
                    if processed % PROGRESS_LOG_INTERVAL == 0 {
                        info!(processed, "CDC consumer progress");
                    }
                }
                Applied::Skipped => {
                    if let Err(e) = message.ack().await {
                        warn!(error = %e, "failed to ack CDC message");
                    }
                }
                Applied::CacheFailed(e) => {
                    error!(error = %e, "cache operation failed, leaving message unacked for redelivery");
                }
            }
        }
        Ok(())
    }
}

enum Applied {
    Processed,
    Skipped,
    CacheFailed(Error),
}

async fn apply_one(payload: &[u8], snapshot_lsn: Lsn, cache: &dyn Cache) -> Applied {
    let event: CdcEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "skipping malformed CDC message");
            return Applied::Skipped;
        }
    };

    let event_lsn: Lsn = match event.lsn.parse() {
        Ok(lsn) => lsn,
        Err(e) => {
            warn!(error = %e, lsn = %event.lsn, "skipping CDC event with unparseable LSN");
            return Applied::Skipped;
        }
    };
    if event_lsn < snapshot_lsn {
        return Applied::Skipped;
    }

    let Some(pk) = event.primary_key_string() else {
        warn!(table = %event.table, "skipping CDC event with no extractable primary key");
        return Applied::Skipped;
    };

    let result = match event.op {
        Op::Insert | Op::Update => match &event.data {
            Some(data) => cache.set(&event.table, &pk, data).await,
            None => {
                warn!(table = %event.table, "insert/update event missing data, skipping");
                return Applied::Skipped;
            }
        },
        Op::Delete => cache.delete(&event.table, &pk).await,
    };

    match result {
        Ok(()) => Applied::Processed,
        Err(e) => Applied::CacheFailed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fake::FakeCache;
    use serde_json::json;

    fn event(lsn: &str, op: Op, table: &str, key: &str, data: Option<serde_json::Value>) -> Vec<u8> {
        let event = CdcEvent {
            lsn: lsn.to_string(),
            table: table.to_string(),
            op,
            key: json!({ "ticker": key }),
            data,
            timestamp: chrono::Utc::now(),
        };
        serde_json::to_vec(&event).unwrap()
    }

    #[tokio::test]
    async fn pre_snapshot_events_are_skipped() {
        let cache = FakeCache::new();
        let snapshot_lsn: Lsn = "0/100".parse().unwrap();
        let payload = event("0/80", Op::Insert, "markets", "ETHUSD", Some(json!({"ticker": "ETHUSD"})));
        let outcome = apply_one(&payload, snapshot_lsn, &cache).await;
        assert!(matches!(outcome, Applied::Skipped));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn post_snapshot_update_is_applied() {
        let cache = FakeCache::new();
        let snapshot_lsn: Lsn = "0/100".parse().unwrap();
        let payload = event(
            "0/120",
            Op::Update,
            "markets",
            "BTCUSD",
            Some(json!({"ticker": "BTCUSD", "status": "closed"})),
        );
        let outcome = apply_one(&payload, snapshot_lsn, &cache).await;
        assert!(matches!(outcome, Applied::Processed));
        assert_eq!(cache.get("markets", "BTCUSD"), Some(json!({"ticker": "BTCUSD", "status": "closed"})));
    }

    #[tokio::test]
    async fn delete_removes_from_cache() {
        let cache = FakeCache::new();
        cache.set("markets", "X", &json!({"ticker": "X"})).await.unwrap();
        let snapshot_lsn: Lsn = "0/0".parse().unwrap();
        let payload = event("0/200", Op::Delete, "markets", "X", None);
        let outcome = apply_one(&payload, snapshot_lsn, &cache).await;
        assert!(matches!(outcome, Applied::Processed));
        assert_eq!(cache.get("markets", "X"), None);
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped_not_fatal() {
        let cache = FakeCache::new();
        let snapshot_lsn: Lsn = "0/0".parse().unwrap();
        let outcome = apply_one(b"not json", snapshot_lsn, &cache).await;
        assert!(matches!(outcome, Applied::Skipped));
    }

    #[tokio::test]
    async fn repeated_delivery_is_idempotent() {
        let cache = FakeCache::new();
        let snapshot_lsn: Lsn = "0/0".parse().unwrap();
        let payload = event("0/120", Op::Insert, "markets", "BTCUSD", Some(json!({"ticker": "BTCUSD"})));
        apply_one(&payload, snapshot_lsn, &cache).await;
        apply_one(&payload, snapshot_lsn, &cache).await;
        assert_eq!(cache.len(), 1);
    }
}
