//! PostgreSQL logical-replication WAL reader (§4.9).
//!
//! Ensures a named logical slot with output plugin `wal2json`, then polls
//! decoded changes via `pg_logical_slot_get_changes`. This call is
//! destructive on the PostgreSQL side — it advances the slot's
//! `confirmed_flush_lsn` — so every event this returns must be durably
//! published downstream before the next poll, or it is lost for good.

use crate::cdc::event::{CdcEvent, Op};
use crate::error::{Error, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_postgres::NoTls;
use tracing::{error, info, instrument, warn};

pub struct WalReader {
    client: tokio_postgres::Client,
    slot_name: String,
    publication_name: String,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonPayload {
    #[serde(default)]
    change: Vec<Wal2JsonChange>,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonChange {
    kind: String,
    table: String,
    #[serde(default)]
    columnnames: Vec<String>,
    #[serde(default)]
    columnvalues: Vec<Value>,
    #[serde(default)]
    oldkeys: Option<Wal2JsonOldKeys>,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonOldKeys {
    #[serde(default)]
    keynames: Vec<String>,
    #[serde(default)]
    keyvalues: Vec<Value>,
}

impl WalReader {
    /// Opens a connection and spawns the background task that drives it,
    /// the way every `tokio_postgres` client is driven in this ecosystem.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, slot_name: &str, publication_name: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "WAL reader connection closed with error");
            }
        });
        Ok(WalReader {
            client,
            slot_name: slot_name.to_string(),
            publication_name: publication_name.to_string(),
        })
    }

    /// Idempotent: creates the slot with output plugin `wal2json` if
    /// `pg_replication_slots` has no row for `slot_name` yet.
    #[instrument(skip(self))]
    pub async fn ensure_slot(&self) -> Result<()> {
        let existing = self
            .client
            .query_opt(
                "SELECT slot_name FROM pg_replication_slots WHERE slot_name = $1",
                &[&self.slot_name],
            )
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        self.client
            .execute(
                "SELECT pg_create_logical_replication_slot($1, 'wal2json')",
                &[&self.slot_name],
            )
            .await
            .map_err(|e| Error::replication(format!("failed to create slot {}: {e}", self.slot_name)))?;
        info!(slot = %self.slot_name, "created logical replication slot");
        Ok(())
    }

    pub async fn current_lsn(&self) -> Result<String> {
        let row = self.client.query_one("SELECT pg_current_wal_lsn()::text", &[]).await?;
        Ok(row.get(0))
    }

    pub fn publication_name(&self) -> &str {
        &self.publication_name
    }

    /// Destructive: advances `confirmed_flush_lsn` on the server. Callers
    /// MUST durably publish every returned event before the next call.
    #[instrument(skip(self))]
    pub async fn poll_changes(&self) -> Result<Vec<CdcEvent>> {
        let rows = self
            .client
            .query(
                "SELECT lsn, data FROM pg_logical_slot_get_changes($1, NULL, NULL, \
                 'include-lsn', '1', 'include-timestamp', '1')",
                &[&self.slot_name],
            )
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let lsn: String = row.get(0);
            let data: String = row.get(1);
            match serde_json::from_str::<Wal2JsonPayload>(&data) {
                Ok(payload) => events.extend(decode_changes(&lsn, payload)),
                Err(e) => warn!(error = %e, "skipping malformed wal2json row"),
            }
        }
        Ok(events)
    }
}

fn decode_changes(lsn: &str, payload: Wal2JsonPayload) -> Vec<CdcEvent> {
    let now = Utc::now();
    payload
        .change
        .into_iter()
        .filter_map(|change| decode_change(lsn, change, now))
        .collect()
}

fn decode_change(lsn: &str, change: Wal2JsonChange, timestamp: chrono::DateTime<Utc>) -> Option<CdcEvent> {
    let op = match change.kind.as_str() {
        "insert" => Op::Insert,
        "update" => Op::Update,
        "delete" => Op::Delete,
        other => {
            warn!(kind = other, "skipping unsupported wal2json change kind");
            return None;
        }
    };

    let key = extract_key(&change);
    let data = extract_data(&change);

    Some(CdcEvent {
        lsn: lsn.to_string(),
        table: change.table,
        op,
        key,
        data,
        timestamp,
    })
}

/// First column is the pragmatic primary-key rule this crate uses: it
/// holds for every table this system warms (`ticker`, `event_ticker`,
/// `series_ticker` are all declared first). Reusing this for a table whose
/// first column isn't the PK requires passing an explicit PK column name.
fn extract_key(change: &Wal2JsonChange) -> Value {
    if let (Some(name), Some(value)) = (change.columnnames.first(), change.columnvalues.first()) {
        let mut object = Map::new();
        object.insert(name.clone(), value.clone());
        return Value::Object(object);
    }
    if let Some(oldkeys) = &change.oldkeys {
        if let (Some(name), Some(value)) = (oldkeys.keynames.first(), oldkeys.keyvalues.first()) {
            let mut object = Map::new();
            object.insert(name.clone(), value.clone());
            return Value::Object(object);
        }
    }
    Value::Null
}

fn extract_data(change: &Wal2JsonChange) -> Option<Value> {
    if change.columnnames.len() != change.columnvalues.len() || change.columnnames.is_empty() {
        return None;
    }
    let mut object = Map::new();
    for (name, value) in change.columnnames.iter().zip(change.columnvalues.iter()) {
        object.insert(name.clone(), value.clone());
    }
    Some(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_insert_with_first_column_as_key() {
        let change: Wal2JsonChange = serde_json::from_value(serde_json::json!({
            "kind": "insert",
            "table": "markets",
            "columnnames": ["ticker", "status"],
            "columnvalues": ["BTCUSD", "active"]
        }))
        .unwrap();
        let event = decode_change("0/1", change, Utc::now()).unwrap();
        assert_eq!(event.op, Op::Insert);
        assert_eq!(event.key, serde_json::json!({"ticker": "BTCUSD"}));
        assert_eq!(event.data, Some(serde_json::json!({"ticker": "BTCUSD", "status": "active"})));
    }

    #[test]
    fn decodes_delete_using_oldkeys() {
        let change: Wal2JsonChange = serde_json::from_value(serde_json::json!({
            "kind": "delete",
            "table": "markets",
            "oldkeys": {"keynames": ["ticker"], "keyvalues": ["X"]}
        }))
        .unwrap();
        let event = decode_change("0/200", change, Utc::now()).unwrap();
        assert_eq!(event.op, Op::Delete);
        assert_eq!(event.key, serde_json::json!({"ticker": "X"}));
        assert_eq!(event.data, None);
    }

    #[test]
    fn skips_unsupported_kind() {
        let change: Wal2JsonChange = serde_json::from_value(serde_json::json!({
            "kind": "truncate",
            "table": "markets"
        }))
        .unwrap();
        assert!(decode_change("0/1", change, Utc::now()).is_none());
    }

    #[test]
    fn mismatched_column_arrays_omit_data() {
        let change: Wal2JsonChange = serde_json::from_value(serde_json::json!({
            "kind": "update",
            "table": "markets",
            "columnnames": ["ticker", "status"],
            "columnvalues": ["BTCUSD"]
        }))
        .unwrap();
        let event = decode_change("0/5", change, Utc::now()).unwrap();
        assert_eq!(event.data, None);
    }
}
