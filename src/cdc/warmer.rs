//! Cache warmer: snapshots PostgreSQL into the secmaster cache (§4.12).
//!
//! The snapshot LSN is captured *before* warming, not after: any row
//! committed while warming is in progress has `lsn > L0`, so the CDC
//! consumer will replay it once it starts consuming. Snapshotting after
//! warming would risk missing rows committed between the warm and the
//! snapshot — there would be no event to replay them.

use crate::cache::Cache;
use crate::error::Result;
use tokio_postgres::NoTls;
use tracing::{info, instrument};

pub struct CacheWarmer {
    client: tokio_postgres::Client,
}

/// A table to warm, paired with the column that is its primary key (§9:
/// the "first column is PK" rule from the WAL decoder is a simplification
/// that holds for `ticker`/`event_ticker`/`series_ticker`; the warmer
/// takes the PK column explicitly instead of guessing).
#[derive(Debug, Clone)]
pub struct WarmTable {
    pub name: String,
    pub primary_key_column: String,
}

impl CacheWarmer {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "cache warmer connection closed with error");
            }
        });
        Ok(CacheWarmer { client })
    }

    pub async fn current_lsn(&self) -> Result<String> {
        let row = self.client.query_one("SELECT pg_current_wal_lsn()::text", &[]).await?;
        Ok(row.get(0))
    }

    #[instrument(skip(self, cache))]
    async fn warm_table(&self, cache: &dyn Cache, table: &WarmTable) -> Result<usize> {
        let query = format!(
            "SELECT {pk}::text, row_to_json({table}.*) FROM {table}",
            pk = table.primary_key_column,
            table = table.name
        );
        let rows = self.client.query(&query, &[]).await?;
        for row in &rows {
            let pk: String = row.get(0);
            let json: serde_json::Value = row.get(1);
            cache.set(&table.name, &pk, &json).await?;
        }
        Ok(rows.len())
    }

    /// Captures `L0`, warms every configured table (ideally within one
    /// transaction; at minimum `L0` is captured before any warm begins),
    /// and returns `L0`.
    #[instrument(skip(self, cache, tables))]
    pub async fn warm_all(&self, cache: &dyn Cache, tables: &[WarmTable]) -> Result<String> {
        let snapshot_lsn = self.current_lsn().await?;
        let mut total_rows = 0usize;
        for table in tables {
            total_rows += self.warm_table(cache, table).await?;
        }
        info!(snapshot_lsn = %snapshot_lsn, rows = total_rows, tables = tables.len(), "cache warm complete");
        Ok(snapshot_lsn)
    }
}
