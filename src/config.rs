//! Per-subcommand configuration, built from environment variables and
//! CLI flags (§6.3).
//!
//! Each subcommand owns its own config struct rather than a single
//! monolithic one — `hot-path` has no business needing `DATABASE_URL`,
//! and `wal-publish` has no business needing `SLOT_SIZE`. `clap`'s `env`
//! feature lets a flag and its environment-variable fallback live in one
//! declaration.

use clap::Args;

fn default_cdc_tables() -> String {
    "events,markets,series_fees".to_string()
}

/// Shared by `wal-publish` and `cache-sync`: both talk to the same
/// PostgreSQL database and the same NATS CDC stream.
#[derive(Debug, Clone, Args)]
pub struct CdcConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,

    #[arg(long, env = "NATS_STREAM", default_value = "SECMASTER_CDC")]
    pub nats_stream: String,

    /// Comma-separated table names warmed into the cache and watched for
    /// changes.
    #[arg(long, env = "CDC_TABLES", default_value_t = default_cdc_tables())]
    pub cdc_tables: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9090")]
    pub metrics_addr: String,
}

impl CdcConfig {
    pub fn tables(&self) -> Vec<&str> {
        self.cdc_tables.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
    }
}

/// `wal-publish`: reads PostgreSQL's logical-replication stream and
/// republishes decoded changes onto the CDC stream.
#[derive(Debug, Clone, Args)]
pub struct WalPublishConfig {
    #[command(flatten)]
    pub cdc: CdcConfig,

    #[arg(long, env = "REPLICATION_SLOT", default_value = "ssmd_cdc")]
    pub replication_slot: String,

    #[arg(long, env = "PUBLICATION_NAME", default_value = "ssmd_cdc_pub")]
    pub publication_name: String,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,
}

/// `cache-sync`: warms the secmaster cache from PostgreSQL, then
/// consumes the CDC stream and applies changes to Redis.
#[derive(Debug, Clone, Args)]
pub struct CacheSyncConfig {
    #[command(flatten)]
    pub cdc: CdcConfig,

    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    pub redis_url: String,

    #[arg(long, env = "CONSUMER_NAME", default_value = "ssmd-cache")]
    pub consumer_name: String,

    /// The primary-key column for each table in `cdc.tables()`, in the
    /// same order, separated by commas (§9: made explicit rather than
    /// guessed from column order).
    #[arg(long, env = "CDC_TABLE_PRIMARY_KEYS", default_value = "ticker,ticker,ticker")]
    pub primary_key_columns: String,
}

impl CacheSyncConfig {
    pub fn warm_tables(&self) -> Vec<crate::cdc::WarmTable> {
        self.cdc
            .tables()
            .into_iter()
            .zip(self.primary_key_columns.split(',').map(str::trim))
            .map(|(name, pk)| crate::cdc::WarmTable { name: name.to_string(), primary_key_column: pk.to_string() })
            .collect()
    }
}

/// `hot-path`: runs the in-memory transport, journal, and ring-backed
/// disk flusher for a single feed.
#[derive(Debug, Clone, Args)]
pub struct HotPathConfig {
    #[arg(long, env = "SSMD_ENV", default_value = "dev")]
    pub env: String,

    #[arg(long, env = "SSMD_FEED")]
    pub feed: String,

    #[arg(long, env = "SSMD_BASE_DIR", default_value = "./data")]
    pub base_dir: String,

    #[arg(long, env = "SLOT_SIZE", default_value_t = 4096)]
    pub slot_size: usize,

    #[arg(long, env = "RING_SLOTS", default_value_t = 65536)]
    pub ring_slots: u64,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9090")]
    pub metrics_addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_list_has_three_entries() {
        let config = CdcConfig {
            database_url: "postgres://localhost/test".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            nats_stream: "SECMASTER_CDC".to_string(),
            cdc_tables: default_cdc_tables(),
            metrics_addr: "127.0.0.1:9090".to_string(),
        };
        assert_eq!(config.tables(), vec!["events", "markets", "series_fees"]);
    }

    #[test]
    fn warm_tables_zips_names_with_primary_keys() {
        let config = CacheSyncConfig {
            cdc: CdcConfig {
                database_url: "postgres://localhost/test".to_string(),
                nats_url: "nats://localhost:4222".to_string(),
                nats_stream: "SECMASTER_CDC".to_string(),
                cdc_tables: "markets,events".to_string(),
                metrics_addr: "127.0.0.1:9090".to_string(),
            },
            redis_url: "redis://localhost:6379".to_string(),
            consumer_name: "ssmd-cache".to_string(),
            primary_key_columns: "ticker,event_ticker".to_string(),
        };
        let tables = config.warm_tables();
        assert_eq!(tables[0].name, "markets");
        assert_eq!(tables[0].primary_key_column, "ticker");
        assert_eq!(tables[1].name, "events");
        assert_eq!(tables[1].primary_key_column, "event_ticker");
    }
}
