use clap::{Parser, Subcommand};
use ssmd::cache::RedisCache;
use ssmd::cdc::{CacheWarmer, CdcConsumer, CdcPublisher};
use ssmd::config::{CacheSyncConfig, HotPathConfig, WalPublishConfig};
use ssmd::journal::Journal;
use ssmd::metrics::Metrics;
use ssmd::publisher::Publisher;
use ssmd::transport::Transport;
use ssmd::wal::WalReader;
use ssmd::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ssmd", about = "Market-data hot path and PostgreSQL-to-Redis CDC fan-out")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the in-memory transport, journal, and disk flusher for one feed.
    HotPath(HotPathConfig),
    /// Read PostgreSQL's logical-replication stream and publish decoded
    /// changes onto the CDC message bus.
    WalPublish(WalPublishConfig),
    /// Warm the secmaster cache from PostgreSQL, then apply the CDC
    /// stream to Redis as it arrives.
    CacheSync(CacheSyncConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::HotPath(config) => run_hot_path(config).await,
        Command::WalPublish(config) => run_wal_publish(config).await,
        Command::CacheSync(config) => run_cache_sync(config).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "ssmd exited with an error");
    }
    Ok(result?)
}

async fn run_hot_path(config: HotPathConfig) -> Result<()> {
    let ring_path = std::path::Path::new(&config.base_dir).join(format!("{}.ring", config.feed));
    let (producer, consumer) = ssmd::ring::create(
        &ring_path,
        ssmd::ring::RingConfig { slot_size: config.slot_size, ring_slots: config.ring_slots },
    )
    .map_err(|e| Error::storage_write(format!("failed to create ring at {}: {e}", ring_path.display())))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flusher_handle = ssmd::flusher::spawn(consumer, &config.base_dir, &config.feed, shutdown.clone());

    let transport = Arc::new(Transport::new());
    let journal = Arc::new(Journal::new());
    let _publisher = Publisher::new(transport, journal, &config.env, &config.feed);
    let _producer = producer;

    let metrics = Arc::new(Metrics::new());
    spawn_metrics_server(config.metrics_addr.clone(), metrics);

    info!(feed = %config.feed, env = %config.env, "hot path running");
    tokio::signal::ctrl_c().await.map_err(|e| Error::config(format!("failed to install signal handler: {e}")))?;
    info!("shutdown requested, draining ring");

    shutdown.store(true, Ordering::Relaxed);
    flusher_handle.join().map_err(|_| Error::config("flusher thread panicked"))?;
    Ok(())
}

async fn run_wal_publish(config: WalPublishConfig) -> Result<()> {
    let reader = WalReader::connect(&config.cdc.database_url, &config.replication_slot, &config.publication_name).await?;
    reader.ensure_slot().await?;

    let publisher = CdcPublisher::new(&config.cdc.nats_url, &config.cdc.nats_stream).await?;
    publisher.ensure_stream().await?;

    let metrics = Arc::new(Metrics::new());
    spawn_metrics_server(config.cdc.metrics_addr.clone(), metrics.clone());

    info!(slot = %config.replication_slot, "wal-publish running");
    loop {
        let events = match reader.poll_changes().await {
            Ok(events) => events,
            Err(e) => {
                metrics.wal_poll_errors.inc();
                error!(error = %e, "WAL poll failed, retrying in 5s");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        for event in &events {
            if let Err(e) = publisher.publish(event).await {
                metrics.cdc_publish_failures.inc();
                return Err(e);
            }
        }
        if !events.is_empty() {
            info!(count = events.len(), "published CDC events");
        }
        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

async fn run_cache_sync(config: CacheSyncConfig) -> Result<()> {
    let warmer = CacheWarmer::connect(&config.cdc.database_url).await?;
    let cache = RedisCache::connect(&config.redis_url).await?;
    let tables = config.warm_tables();
    let snapshot_lsn = warmer.warm_all(&cache, &tables).await?;

    let metrics = Arc::new(Metrics::new());
    spawn_metrics_server(config.cdc.metrics_addr.clone(), metrics);

    let consumer = CdcConsumer::new(&config.cdc.nats_url, &config.cdc.nats_stream, &config.consumer_name, &snapshot_lsn).await?;
    info!(snapshot_lsn = %snapshot_lsn, "cache-sync running");
    consumer.run(&cache).await
}

fn spawn_metrics_server(addr: String, metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        if let Err(e) = ssmd::metrics::serve(&addr, metrics).await {
            error!(error = %e, "metrics server exited");
        }
    });
}
