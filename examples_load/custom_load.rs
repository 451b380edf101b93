use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use logbatch::batcher::{Batcher, BatcherConfig, DeliveryPolicy};
use logbatch::noop::NoopStore;
use logbatch::LogRecord;

/// Eight producers share one handle; larger batches, a deeper queue and
/// more concurrent writes than the defaults.
#[tokio::main]
async fn main() {
    let config = BatcherConfig {
        flush_size: 1_000,
        flush_interval: Duration::from_millis(200),
        queue_multiplier: 50,
        max_in_flight: 4,
        shutdown_timeout: Duration::from_secs(2),
        delivery: DeliveryPolicy::BestEffort,
    };

    let (batcher, handle) = Batcher::new(Arc::new(NoopStore), config);
    let run = tokio::spawn(batcher.run(CancellationToken::new()));

    let producers: u64 = 8;
    let per_producer: u64 = 12_500;
    let start = Instant::now();

    let mut tasks = Vec::new();
    for p in 0..producers {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..per_producer {
                let record = LogRecord::new(format!("producer-{p}"), "error", "custom load test error")
                    .with_attribute("iteration", i.to_string());
                if handle.submit(record).await.is_err() {
                    break;
                }
            }
        }));
    }
    for task in tasks {
        let _ = task.await;
    }

    let n = producers * per_producer;
    let elapsed = start.elapsed();
    println!("custom config: submitted {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    handle.close().await;
    if let Ok(stats) = run.await {
        println!("{stats:?}");
    }
}
