#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::response::Response;
use logbatch::query::LogQuery;
use logbatch::store::{InsertError, LogReader, LogWriter, StoreError};
use logbatch::LogRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Reader that counts calls and delegates to an inner reader.
pub struct CountingReader<R> {
    pub inner: Arc<R>,
    calls: AtomicUsize,
}

impl<R> CountingReader<R> {
    pub fn new(inner: Arc<R>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: LogReader> LogReader for CountingReader<R> {
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query).await
    }
}

/// Writer that records batch sizes and always fails.
#[derive(Default)]
pub struct FailingWriter {
    pub batches: Mutex<Vec<usize>>,
}

#[async_trait]
impl LogWriter for FailingWriter {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<usize, InsertError> {
        self.batches.lock().unwrap().push(records.len());
        Err(InsertError::new(
            0,
            StoreError::Unavailable("connection refused".to_string()),
        ))
    }
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
