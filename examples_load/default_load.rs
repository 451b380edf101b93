use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use logbatch::batcher::{Batcher, BatcherConfig};
use logbatch::config::LogConfig;
use logbatch::init::init_tracing;
use logbatch::noop::NoopStore;
use logbatch::LogRecord;

#[tokio::main]
async fn main() {
    let _ = init_tracing(&LogConfig::default());

    let (batcher, handle) = Batcher::new(Arc::new(NoopStore), BatcherConfig::default());
    let run = tokio::spawn(batcher.run(CancellationToken::new()));

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        let record = LogRecord::new("load-test", "error", "default load test error")
            .with_attribute("iteration", i.to_string());
        if handle.submit(record).await.is_err() {
            break;
        }
    }

    let elapsed = start.elapsed();
    println!("default config: submitted {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    handle.close().await;
    if let Ok(stats) = run.await {
        println!("flushed {} batches, {} records written", stats.flushed_batches, stats.written_records);
    }
}
