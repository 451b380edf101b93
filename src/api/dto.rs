//! Request and response bodies.

use crate::query::QueryEcho;
use crate::record::{parse_timestamp, LogRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `POST /v1/logs:batchWrite`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchWriteRequest {
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

/// One entry as sent by a producer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogEntry {
    /// RFC3339, optionally with fractional seconds. Any other JSON value is
    /// treated like a missing timestamp.
    #[serde(default)]
    pub ts: Option<Value>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
}

impl LogEntry {
    /// Convert into a record, stamping `received_at` when `ts` is missing or
    /// unparsable.
    pub fn into_record(self, received_at: DateTime<Utc>) -> LogRecord {
        LogRecord {
            timestamp: parse_timestamp(self.ts.as_ref().and_then(Value::as_str), received_at),
            service: self.service,
            level: self.level,
            message: self.msg,
            attributes: self.attrs,
            trace_id: self.trace_id,
            span_id: self.span_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchWriteResponse {
    pub written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub logs: Vec<LogRecord>,
    pub count: usize,
    pub query: QueryEcho,
}

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable error code
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_with_nanosecond_timestamp() {
        let entry: LogEntry = serde_json::from_value(serde_json::json!({
            "ts": "2024-03-01T10:00:00.123456789Z",
            "service": "auth",
            "level": "info",
            "msg": "login",
            "attrs": {"user": "alice"},
            "trace_id": "t1"
        }))
        .unwrap();

        let now = Utc::now();
        let record = entry.into_record(now);
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_789)
        );
        assert_eq!(record.message, "login");
        assert_eq!(record.user(), Some("alice"));
        assert_eq!(record.trace_id, "t1");
        assert_eq!(record.span_id, "");
    }

    #[test]
    fn test_entry_bad_timestamp_uses_receipt_time() {
        let entry = LogEntry {
            ts: Some(Value::from("not-a-time")),
            service: "auth".to_string(),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 5, 5, 5, 5).unwrap();
        assert_eq!(entry.into_record(now).timestamp, now);
    }

    #[test]
    fn test_entry_non_string_timestamp_uses_receipt_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 5, 5, 5, 5).unwrap();
        for ts in [
            serde_json::json!(1_700_000_000),
            serde_json::json!(null),
            serde_json::json!({"seconds": 1}),
        ] {
            let entry: LogEntry = serde_json::from_value(serde_json::json!({
                "ts": ts,
                "service": "auth",
                "msg": "login"
            }))
            .unwrap();
            assert_eq!(entry.into_record(now).timestamp, now);
        }
    }

    #[test]
    fn test_empty_request_body() {
        let request: BatchWriteRequest = serde_json::from_str("{}").unwrap();
        assert!(request.entries.is_empty());
    }
}
