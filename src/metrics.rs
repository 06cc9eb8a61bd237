//! Prometheus metrics and the `/metrics` + `/health` HTTP endpoints.
//!
//! Every counter named here corresponds to an "Operator metric" callout
//! in one of the module sections: ring backpressure, flusher rotation
//! failures, transport subscriber drops, WAL poll errors, CDC publish
//! failures, and CDC consumer decode failures. Counters, not gauges —
//! operators alert on rate-of-increase, not absolute level.

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct Metrics {
    registry: Registry,
    pub ring_backpressure_rejections: IntCounter,
    pub flusher_rotation_failures: IntCounter,
    pub transport_subscriber_drops: IntCounter,
    pub wal_poll_errors: IntCounter,
    pub cdc_publish_failures: IntCounter,
    pub cdc_consumer_decode_failures: IntCounter,
    pub cdc_events_processed: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            let counter = IntCounter::new(name, help).expect("metric name/help are valid");
            registry.register(Box::new(counter.clone())).expect("metric name is unique");
            counter
        };

        Metrics {
            ring_backpressure_rejections: counter(
                "ssmd_ring_backpressure_rejections_total",
                "Messages rejected by a hot-path ring because it was full",
            ),
            flusher_rotation_failures: counter(
                "ssmd_flusher_rotation_failures_total",
                "Disk flusher failures to rotate or open the day's output file",
            ),
            transport_subscriber_drops: counter(
                "ssmd_transport_subscriber_drops_total",
                "Transport subscribers that fell behind and lost buffered messages",
            ),
            wal_poll_errors: counter(
                "ssmd_wal_poll_errors_total",
                "WAL reader poll cycles that failed to decode or fetch changes",
            ),
            cdc_publish_failures: counter(
                "ssmd_cdc_publish_failures_total",
                "CDC events that failed to publish or acknowledge on the message bus",
            ),
            cdc_consumer_decode_failures: counter(
                "ssmd_cdc_consumer_decode_failures_total",
                "CDC messages the cache-sync consumer could not decode",
            ),
            cdc_events_processed: counter(
                "ssmd_cdc_events_processed_total",
                "CDC events successfully applied to the secmaster cache",
            ),
            registry,
        }
    }

    fn render(&self) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .expect("prometheus text encoding never fails for well-formed metrics");
        String::from_utf8(buffer).expect("prometheus text encoding is always valid UTF-8")
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    metrics.render()
}

async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Serves `/metrics` and `/health` on `addr` until the process exits.
#[instrument(skip(metrics))]
pub async fn serve(addr: &str, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "metrics server listening");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_render() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ring_backpressure_rejections.get(), 0);
        metrics.ring_backpressure_rejections.inc();
        let rendered = metrics.render();
        assert!(rendered.contains("ssmd_ring_backpressure_rejections_total 1"));
    }

    #[test]
    fn each_counter_has_a_distinct_name() {
        // Registering two counters under the same name panics, so
        // constructing `Metrics` twice is itself the regression test.
        let _a = Metrics::new();
        let _b = Metrics::new();
    }
}
