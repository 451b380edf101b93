use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use logbatch::{
    batcher::{Batcher, BatcherConfig},
    record::LogRecord,
    store::{InsertError, LogWriter},
};

/// Example of integrating a completely custom backend by implementing
/// the `LogWriter` trait directly. Imagine this talks to some
/// proprietary DB for which this crate does not provide a built-in
/// store.
struct MyCustomDbWriter;

#[async_trait]
impl LogWriter for MyCustomDbWriter {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<usize, InsertError> {
        // Here you would call your own client library for the target DB.
        // For the sake of example we just print the batch.
        println!("[my-custom-db] batch of {}", records.len());
        for record in records {
            println!("[my-custom-db]   {} {} {}", record.service, record.level, record.message);
        }
        Ok(records.len())
    }
}

#[tokio::main]
async fn main() {
    let writer: Arc<dyn LogWriter> = Arc::new(MyCustomDbWriter);
    let (batcher, handle) = Batcher::new(writer, BatcherConfig::default());
    let run = tokio::spawn(batcher.run(CancellationToken::new()));

    let _ = handle
        .submit_many([
            LogRecord::new("billing", "info", "custom backend example started"),
            LogRecord::new("billing", "error", "simulated error sent via custom backend")
                .with_attribute("db", "my-custom-db"),
        ])
        .await;

    handle.close().await;
    let _ = run.await;
}
