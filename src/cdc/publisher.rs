//! Durable CDC publisher on the message bus (§4.11).
//!
//! Ensures the durable stream exists, then publishes each event to
//! `cdc.{table}.{op}` and awaits the stream's acknowledgement before
//! returning. A publish failure must propagate to the caller rather than
//! be swallowed — the WAL reader's poll loop depends on that propagation
//! to avoid advancing past an event that was never durably handled.

use crate::cdc::event::CdcEvent;
use crate::error::{Error, Result};
use async_nats::jetstream::{self, stream::StorageType};
use std::time::Duration;
use tracing::instrument;

/// Retention bound from §3.7 / §6.2: whichever limit is hit last drops the
/// oldest message.
pub const STREAM_MAX_MESSAGES: i64 = 100_000;
pub const STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct CdcPublisher {
    jetstream: jetstream::Context,
    stream_name: String,
}

impl CdcPublisher {
    pub async fn new(nats_url: &str, stream_name: &str) -> Result<Self> {
        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| Error::transport_connection(format!("failed to connect to NATS at {nats_url}: {e}")))?;
        let jetstream = jetstream::new(client);
        Ok(CdcPublisher { jetstream, stream_name: stream_name.to_string() })
    }

    /// Idempotent: creates the durable stream if it doesn't already exist,
    /// with subject filter `cdc.>`, file storage, and the retention bound
    /// from §3.7.
    #[instrument(skip(self))]
    pub async fn ensure_stream(&self) -> Result<()> {
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name.clone(),
                subjects: vec!["cdc.>".to_string()],
                storage: StorageType::File,
                max_messages: STREAM_MAX_MESSAGES,
                max_age: STREAM_MAX_AGE,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::replication(format!("failed to ensure CDC stream {}: {e}", self.stream_name)))?;
        Ok(())
    }

    /// Serialises `event` as JSON and publishes it, awaiting stream
    /// acknowledgement before returning.
    #[instrument(skip(self, event), fields(table = %event.table, lsn = %event.lsn))]
    pub async fn publish(&self, event: &CdcEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        let ack_future = self
            .jetstream
            .publish(event.subject(), payload.into())
            .await
            .map_err(|e| Error::transport_publish(format!("CDC publish failed: {e}")))?;
        ack_future
            .await
            .map_err(|e| Error::transport_publish(format!("CDC publish was not acknowledged: {e}")))?;
        Ok(())
    }
}
