use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use logbatch::{
    backend::{open_stores, parse_dsn},
    batcher::{Batcher, BatcherConfig},
    query::{LogQuery, QueryParams},
    record::LogRecord,
};

#[tokio::main]
async fn main() {
    // Example DSN: clickhouse://default:@127.0.0.1:8123/observability
    // The `logs` table is created on first use.
    let dsn = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "clickhouse://default:@127.0.0.1:8123/default".to_string());

    let backend_cfg = parse_dsn(&dsn).expect("invalid DATABASE_URL");
    let stores = open_stores(&backend_cfg, None)
        .await
        .expect("failed to open clickhouse store");

    let (batcher, handle) = Batcher::new(stores.writer, BatcherConfig::default());
    let run = tokio::spawn(batcher.run(CancellationToken::new()));

    handle
        .submit(
            LogRecord::new("clickhouse-example", "error", "simulated error sent via ClickHouse")
                .with_attribute("user", "alice")
                .with_attribute("error_code", "123"),
        )
        .await
        .expect("batcher closed");

    handle.close().await;
    let stats = run.await.expect("batcher task failed");
    println!("written: {}, failed: {}", stats.written_records, stats.failed_records);

    let now = Utc::now();
    let query = LogQuery::from_params(&QueryParams {
        service: Some("clickhouse-example".to_string()),
        user: Some("alice".to_string()),
        from: Some((now - Duration::hours(1)).to_rfc3339()),
        to: Some(now.to_rfc3339()),
        ..Default::default()
    })
    .expect("valid query");

    for record in stores.reader.query(&query).await.expect("query failed") {
        println!("{} [{}] {}", record.timestamp, record.level, record.message);
    }
}
