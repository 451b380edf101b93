use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key consulted by the `user` query filter.
pub const USER_ATTRIBUTE: &str = "user";

/// One canonical log event.
///
/// Records are moved into the batcher by value and never touched again by
/// the producer, so nothing mutates a record once it is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
}

impl LogRecord {
    /// Create a record stamped with the current UTC time.
    pub fn new(
        service: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            service: service.into(),
            level: level.into(),
            message: message.into(),
            attributes: BTreeMap::new(),
            trace_id: String::new(),
            span_id: String::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self.span_id = span_id.into();
        self
    }

    /// The `user` attribute, if the producer attached one.
    pub fn user(&self) -> Option<&str> {
        self.attributes.get(USER_ATTRIBUTE).map(String::as_str)
    }
}

/// Parse an RFC3339 timestamp, with or without fractional seconds.
///
/// Missing, empty or unparsable input falls back to `now`; ingestion never
/// rejects an entry because of its timestamp.
pub fn parse_timestamp(text: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(now)
}
