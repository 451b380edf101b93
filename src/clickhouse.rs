use crate::query::LogQuery;
use crate::record::LogRecord;
use crate::store::{InsertError, LogReader, LogWriter, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Column layout shared by inserts and queries. `ts` keeps nanoseconds.
const COLUMNS: &str = "ts, service, level, message, attributes, trace_id, span_id";

/// Format used for `DateTime64(9, 'UTC')` values in rows and parameters.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Configuration for [`ClickHouseStore`].
///
/// The store talks to ClickHouse over HTTP: inserts use `JSONEachRow`,
/// queries bind every user-supplied value through `param_*` query
/// parameters.
#[derive(Clone, Debug)]
pub struct ClickHouseConfig {
    /// Base URL without query, e.g. "http://127.0.0.1:8123"
    pub url: String,
    pub database: String,
    pub table: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout; the batcher itself never times writes out.
    pub timeout: Duration,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8123".to_string(),
            database: "default".to_string(),
            table: "logs".to_string(),
            user: None,
            password: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// ClickHouse implementation of [`LogWriter`] and [`LogReader`].
#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
    config: ClickHouseConfig,
}

impl ClickHouseStore {
    /// Construct a store using the provided configuration.
    ///
    /// No request is made here; call [`ping`](Self::ping) and
    /// [`ensure_schema`](Self::ensure_schema) at startup.
    pub fn new(config: ClickHouseConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    fn endpoint(&self, params: &[(&str, &str)]) -> String {
        let mut query = format!("database={}", urlencoding::encode(&self.config.database));

        if let Some(user) = &self.config.user {
            query.push_str(&format!("&user={}", urlencoding::encode(user)));
        }
        if let Some(password) = &self.config.password {
            query.push_str(&format!("&password={}", urlencoding::encode(password)));
        }
        for (key, value) in params {
            query.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }

        format!("{}/?{}", self.config.url.trim_end_matches('/'), query)
    }

    async fn post(&self, url: String, body: String) -> Result<String, StoreError> {
        let resp = self.client.post(&url).body(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.text().await?)
        } else {
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(StoreError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Check that the server answers on its `/ping` endpoint.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}/ping", self.config.url.trim_end_matches('/'));
        let resp = self.client.get(&url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Status {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }

    /// Create the log table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
  ts          DateTime64(9, 'UTC'),
  service     LowCardinality(String),
  level       LowCardinality(String),
  message     String,
  attributes  Map(String, String),
  trace_id    String,
  span_id     String
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(ts)
ORDER BY (service, ts)
SETTINGS index_granularity = 8192",
            self.config.table
        );
        self.post(self.endpoint(&[]), ddl).await?;
        info!(database = %self.config.database, table = %self.config.table, "clickhouse schema ready");
        Ok(())
    }

    /// Expire rows older than `days` days. Zero leaves the table untouched.
    pub async fn apply_retention(&self, days: u32) -> Result<(), StoreError> {
        if days == 0 {
            return Ok(());
        }
        let ddl = format!(
            "ALTER TABLE {} MODIFY TTL toDateTime(ts) + INTERVAL {} DAY DELETE",
            self.config.table, days
        );
        self.post(self.endpoint(&[]), ddl).await?;
        info!(table = %self.config.table, days, "clickhouse retention applied");
        Ok(())
    }

    fn select_statement(&self, query: &LogQuery) -> String {
        let mut sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE service = {{service:String}} \
             AND ts BETWEEN {{from:DateTime64(9, 'UTC')}} AND {{to:DateTime64(9, 'UTC')}}",
            self.config.table
        );
        if query.level.is_some() {
            sql.push_str(" AND level = {level:String}");
        }
        if query.user.is_some() {
            sql.push_str(" AND attributes['user'] = {user:String}");
        }
        sql.push_str(" ORDER BY ts DESC LIMIT {limit:UInt64} FORMAT JSONEachRow");
        sql
    }
}

#[derive(Serialize, Deserialize)]
struct ClickHouseRow {
    ts: String,
    service: String,
    level: String,
    message: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    trace_id: String,
    #[serde(default)]
    span_id: String,
}

impl From<&LogRecord> for ClickHouseRow {
    fn from(record: &LogRecord) -> Self {
        Self {
            ts: record.timestamp.format(TS_FORMAT).to_string(),
            service: record.service.clone(),
            level: record.level.clone(),
            message: record.message.clone(),
            attributes: record.attributes.clone(),
            trace_id: record.trace_id.clone(),
            span_id: record.span_id.clone(),
        }
    }
}

impl TryFrom<ClickHouseRow> for LogRecord {
    type Error = StoreError;

    fn try_from(row: ClickHouseRow) -> Result<Self, Self::Error> {
        Ok(LogRecord {
            timestamp: parse_clickhouse_ts(&row.ts)?,
            service: row.service,
            level: row.level,
            message: row.message,
            attributes: row.attributes,
            trace_id: row.trace_id,
            span_id: row.span_id,
        })
    }
}

/// Accept both the `iso` output format and ClickHouse's default
/// `YYYY-MM-DD hh:mm:ss[.fffffffff]` rendering.
fn parse_clickhouse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}

#[async_trait]
impl LogWriter for ClickHouseStore {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<usize, InsertError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut body = String::new();
        for record in records {
            let row = serde_json::to_string(&ClickHouseRow::from(record))
                .map_err(|e| InsertError::new(0, e.into()))?;
            body.push_str(&row);
            body.push('\n');
        }

        let statement = format!("INSERT INTO {} ({COLUMNS}) FORMAT JSONEachRow", self.config.table);
        let url = self.endpoint(&[("query", statement.as_str())]);
        // One HTTP insert is one block on the server side: all rows or none.
        self.post(url, body)
            .await
            .map_err(|e| InsertError::new(0, e))?;
        debug!(rows = records.len(), table = %self.config.table, "clickhouse insert ok");
        Ok(records.len())
    }
}

#[async_trait]
impl LogReader for ClickHouseStore {
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, StoreError> {
        let from = query.from.format(TS_FORMAT).to_string();
        let to = query.to.format(TS_FORMAT).to_string();
        let limit = query.limit.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("date_time_output_format", "iso"),
            ("param_service", query.service.as_str()),
            ("param_from", from.as_str()),
            ("param_to", to.as_str()),
            ("param_limit", limit.as_str()),
        ];
        if let Some(level) = &query.level {
            params.push(("param_level", level.as_str()));
        }
        if let Some(user) = &query.user {
            params.push(("param_user", user.as_str()));
        }

        let started = std::time::Instant::now();
        let body = self.post(self.endpoint(&params), self.select_statement(query)).await?;

        let records = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let row: ClickHouseRow = serde_json::from_str(line)?;
                LogRecord::try_from(row)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            service = %query.service,
            rows = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "clickhouse query ok"
        );
        Ok(records)
    }
}
