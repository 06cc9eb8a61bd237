//! CDC event shape (§3.4, §6.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Insert,
    Update,
    Delete,
}

/// `{ lsn, table, op, key, data?, timestamp }`. `key` is always a
/// one-field object identifying the primary key column and its value.
/// `data` is present for insert/update, absent for delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdcEvent {
    pub lsn: String,
    pub table: String,
    pub op: Op,
    pub key: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl CdcEvent {
    /// The NATS subject this event publishes to: `cdc.{table}.{op}`.
    pub fn subject(&self) -> String {
        let op = match self.op {
            Op::Insert => "insert",
            Op::Update => "update",
            Op::Delete => "delete",
        };
        format!("cdc.{}.{op}", self.table)
    }

    /// First field's value of `key`, rendered as a string — the primary
    /// key value used to address `secmaster:{table}:{pk}`.
    pub fn primary_key_string(&self) -> Option<String> {
        let object = self.key.as_object()?;
        let (_, value) = object.iter().next()?;
        Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_op_as_lowercase_string() {
        let event = CdcEvent {
            lsn: "0/16B3748".to_string(),
            table: "markets".to_string(),
            op: Op::Update,
            key: json!({"ticker": "INXD-25-B4000"}),
            data: Some(json!({"ticker": "INXD-25-B4000", "status": "active"})),
            timestamp: Utc::now(),
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["op"], "update");
        assert_eq!(event.subject(), "cdc.markets.update");
    }

    #[test]
    fn delete_omits_data_field() {
        let event = CdcEvent {
            lsn: "0/200".to_string(),
            table: "markets".to_string(),
            op: Op::Delete,
            key: json!({"ticker": "X"}),
            data: None,
            timestamp: Utc::now(),
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert!(!encoded.as_object().unwrap().contains_key("data"));
    }

    #[test]
    fn primary_key_string_reads_first_key_field() {
        let event = CdcEvent {
            lsn: "0/1".to_string(),
            table: "markets".to_string(),
            op: Op::Insert,
            key: json!({"ticker": "BTCUSD"}),
            data: Some(json!({"ticker": "BTCUSD"})),
            timestamp: Utc::now(),
        };
        assert_eq!(event.primary_key_string(), Some("BTCUSD".to_string()));
    }

    #[test]
    fn serialize_parse_round_trip_modulo_timestamp_precision() {
        let event = CdcEvent {
            lsn: "0/9".to_string(),
            table: "events".to_string(),
            op: Op::Insert,
            key: json!({"event_ticker": "INXD-25"}),
            data: Some(json!({"event_ticker": "INXD-25", "title": "test"})),
            timestamp: Utc::now(),
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: CdcEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.lsn, event.lsn);
        assert_eq!(decoded.table, event.table);
        assert_eq!(decoded.key, event.key);
        assert_eq!(decoded.data, event.data);
    }
}
