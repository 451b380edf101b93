//! Ingestion buffering pipeline.
//!
//! Producers push [`LogRecord`]s through a cloneable [`BatcherHandle`] into a
//! bounded queue. A single flush loop ([`Batcher::run`]) owns the current
//! buffer and hands it to a [`LogWriter`] when it reaches `flush_size` or when
//! `flush_interval` has passed since the last flush, whichever comes first.
//!
//! Writes are dispatched to background tasks so storage latency does not
//! stall ingestion; the number of concurrent writes is capped and shutdown
//! waits for them (up to a timeout) before the loop reports itself stopped.

use crate::record::LogRecord;
use crate::store::{InsertError, LogWriter};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{interval_at, sleep, timeout_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub const DEFAULT_FLUSH_SIZE: usize = 500;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_QUEUE_MULTIPLIER: usize = 4;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How a flushed batch is handed to the writer.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Spawn the write and move on. Failures are reported to the
    /// [`FlushObserver`] and otherwise dropped.
    #[default]
    BestEffort,
    /// Await every write in the flush loop and retry the unwritten remainder
    /// with exponential backoff. Storage latency turns into backpressure.
    Acknowledged {
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    },
}

impl DeliveryPolicy {
    pub fn acknowledged(max_retries: u32) -> Self {
        DeliveryPolicy::Acknowledged {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Buffering configuration for a [`Batcher`].
///
/// **Fields**
/// - `flush_size`: buffer length that triggers a flush.
/// - `flush_interval`: maximum time a record waits in the buffer.
/// - `queue_multiplier`: the inbound queue holds
///   `flush_size * queue_multiplier` records before producers block.
/// - `max_in_flight`: cap on concurrent background writes.
/// - `shutdown_timeout`: how long shutdown waits for in-flight writes.
/// - `delivery`: see [`DeliveryPolicy`].
#[derive(Clone, Debug)]
pub struct BatcherConfig {
    pub flush_size: usize,
    pub flush_interval: Duration,
    pub queue_multiplier: usize,
    pub max_in_flight: usize,
    pub shutdown_timeout: Duration,
    pub delivery: DeliveryPolicy,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_size: DEFAULT_FLUSH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_multiplier: DEFAULT_QUEUE_MULTIPLIER,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            delivery: DeliveryPolicy::BestEffort,
        }
    }
}

impl BatcherConfig {
    pub fn new(flush_size: usize, flush_interval: Duration) -> Self {
        Self {
            flush_size,
            flush_interval,
            ..Self::default()
        }
    }

    /// Replace zero sizes and durations with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.flush_size == 0 {
            self.flush_size = DEFAULT_FLUSH_SIZE;
        }
        if self.flush_interval.is_zero() {
            self.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        if self.queue_multiplier == 0 {
            self.queue_multiplier = DEFAULT_QUEUE_MULTIPLIER;
        }
        if self.max_in_flight == 0 {
            self.max_in_flight = DEFAULT_MAX_IN_FLIGHT;
        }
        self
    }

    pub fn queue_capacity(&self) -> usize {
        self.flush_size.saturating_mul(self.queue_multiplier).max(1)
    }
}

/// Out-of-band signal for flush outcomes.
///
/// Producers never learn whether their records were stored; operators and
/// tests observe it here instead.
pub trait FlushObserver: Send + Sync {
    fn on_flush(&self, _written: usize) {}

    /// A batch (or its unwritten remainder) could not be stored.
    fn on_failure(&self, batch: &[LogRecord], error: &InsertError);

    /// Shutdown gave up waiting on writes still holding `records` records.
    fn on_shutdown_loss(&self, _records: usize) {}
}

/// Default observer: failures become `warn!` events.
#[derive(Clone, Default)]
pub struct TracingObserver;

impl FlushObserver for TracingObserver {
    fn on_failure(&self, batch: &[LogRecord], error: &InsertError) {
        warn!(
            batch_size = batch.len(),
            written = error.written,
            error = %error.source,
            "dropping log batch after failed insert"
        );
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("batcher is closed")]
    Closed,
}

/// `submit_many` stopped part-way; the first `submitted` records were queued.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("queued {submitted} records before failing: {source}")]
pub struct SubmitManyError {
    pub submitted: usize,
    #[source]
    pub source: SubmitError,
}

/// Point-in-time counters for a batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatcherStats {
    pub submitted: u64,
    pub flushed_batches: u64,
    pub written_records: u64,
    pub failed_records: u64,
    pub lost_records: u64,
    pub in_flight_writes: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    flushed_batches: AtomicU64,
    written_records: AtomicU64,
    failed_records: AtomicU64,
    lost_records: AtomicU64,
    buffered: AtomicUsize,
    in_flight_writes: AtomicUsize,
    in_flight_records: AtomicUsize,
}

struct Shared {
    counters: Counters,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl Shared {
    fn snapshot(&self) -> BatcherStats {
        let c = &self.counters;
        BatcherStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            flushed_batches: c.flushed_batches.load(Ordering::Relaxed),
            written_records: c.written_records.load(Ordering::Relaxed),
            failed_records: c.failed_records.load(Ordering::Relaxed),
            lost_records: c.lost_records.load(Ordering::Relaxed),
            in_flight_writes: c.in_flight_writes.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of the pipeline.
#[derive(Clone)]
pub struct BatcherHandle {
    tx: mpsc::Sender<LogRecord>,
    shared: Arc<Shared>,
    stopped: watch::Receiver<bool>,
}

impl BatcherHandle {
    /// Queue one record, waiting while the queue is full.
    ///
    /// Returns [`SubmitError::Closed`] once [`close`](Self::close) was called
    /// or the flush loop has exited.
    pub async fn submit(&self, record: LogRecord) -> Result<(), SubmitError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SubmitError::Closed);
        }
        // Count before the record becomes visible to the flush loop, so the
        // final stats never show a write for a record not yet submitted.
        let permit = self.tx.reserve().await.map_err(|_| SubmitError::Closed)?;
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        permit.send(record);
        Ok(())
    }

    /// Queue records one at a time. Not atomic: on error the prefix that was
    /// already queued stays queued.
    pub async fn submit_many<I>(&self, records: I) -> Result<usize, SubmitManyError>
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut submitted = 0;
        for record in records {
            self.submit(record)
                .await
                .map_err(|source| SubmitManyError { submitted, source })?;
            submitted += 1;
        }
        Ok(submitted)
    }

    /// Stop accepting records and wait until the flush loop has drained the
    /// queue, flushed the last buffer and settled its in-flight writes.
    ///
    /// If the [`Batcher`] is dropped without ever running, this returns as
    /// soon as the drop is observed.
    pub async fn close(&self) {
        self.shared.shutdown.cancel();
        let mut stopped = self.stopped.clone();
        let _ = stopped.wait_for(|done| *done).await;
    }

    /// Records queued or buffered but not yet handed to the writer.
    pub fn pending(&self) -> usize {
        let queued = self.tx.max_capacity() - self.tx.capacity();
        queued + self.shared.counters.buffered.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> BatcherStats {
        self.shared.snapshot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Size,
    Interval,
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Interval => "interval",
            FlushTrigger::Shutdown => "shutdown",
        })
    }
}

/// Consumer side of the pipeline. Create with [`Batcher::new`] and drive it
/// with [`Batcher::run`], usually on its own task.
pub struct Batcher {
    rx: mpsc::Receiver<LogRecord>,
    writer: Arc<dyn LogWriter>,
    observer: Arc<dyn FlushObserver>,
    config: BatcherConfig,
    shared: Arc<Shared>,
    stopped: watch::Sender<bool>,
}

impl Batcher {
    /// Build the flush loop and the handle producers submit through.
    ///
    /// Zero values in `config` are replaced by defaults.
    pub fn new(writer: Arc<dyn LogWriter>, config: BatcherConfig) -> (Self, BatcherHandle) {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel(config.queue_capacity());
        let (stopped, stopped_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        });

        let handle = BatcherHandle {
            tx,
            shared: Arc::clone(&shared),
            stopped: stopped_rx,
        };
        let batcher = Self {
            rx,
            writer,
            observer: Arc::new(TracingObserver),
            config,
            shared,
            stopped,
        };
        (batcher, handle)
    }

    pub fn with_observer(mut self, observer: Arc<dyn FlushObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the flush loop until `cancel` fires or the handle is closed.
    ///
    /// On the way out the queue is closed to producers, everything already
    /// queued is flushed, and in-flight writes get `shutdown_timeout` to
    /// finish. Returns the final counters.
    pub async fn run(self, cancel: CancellationToken) -> BatcherStats {
        let Batcher {
            mut rx,
            writer,
            observer,
            config,
            shared,
            stopped,
        } = self;

        shared.running.store(true, Ordering::Release);
        info!(
            flush_size = config.flush_size,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            queue_capacity = config.queue_capacity(),
            max_in_flight = config.max_in_flight,
            "batcher started"
        );

        let dispatcher = Dispatcher {
            writer,
            observer,
            shared: Arc::clone(&shared),
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            tracker: TaskTracker::new(),
            delivery: config.delivery.clone(),
            cancel: cancel.clone(),
            shutdown_timeout: config.shutdown_timeout,
            deadline: Arc::new(OnceLock::new()),
        };

        let mut buffer: Vec<LogRecord> = Vec::with_capacity(config.flush_size);
        let mut ticker = interval_at(
            Instant::now() + config.flush_interval,
            config.flush_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                () = shared.shutdown.cancelled() => break,

                record = rx.recv() => match record {
                    Some(record) => {
                        buffer.push(record);
                        shared.counters.buffered.store(buffer.len(), Ordering::Relaxed);
                        if buffer.len() >= config.flush_size {
                            dispatcher.flush(&mut buffer, FlushTrigger::Size).await;
                            ticker.reset();
                        }
                    }
                    // every handle is gone
                    None => break,
                },

                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        dispatcher.flush(&mut buffer, FlushTrigger::Interval).await;
                    }
                }
            }
        }

        // Refuse new records, then drain what producers already queued.
        // Everything from here on shares one deadline.
        let deadline = dispatcher.deadline();
        shared.shutdown.cancel();
        rx.close();
        while let Some(record) = rx.recv().await {
            buffer.push(record);
            shared.counters.buffered.store(buffer.len(), Ordering::Relaxed);
            if buffer.len() >= config.flush_size {
                dispatcher.flush(&mut buffer, FlushTrigger::Shutdown).await;
            }
        }
        dispatcher.flush(&mut buffer, FlushTrigger::Shutdown).await;
        dispatcher.drain(deadline).await;

        let stats = shared.snapshot();
        shared.running.store(false, Ordering::Release);
        stopped.send_replace(true);
        info!(
            flushed_batches = stats.flushed_batches,
            written_records = stats.written_records,
            failed_records = stats.failed_records,
            lost_records = stats.lost_records,
            "batcher stopped"
        );
        stats
    }
}

#[derive(Clone)]
struct Dispatcher {
    writer: Arc<dyn LogWriter>,
    observer: Arc<dyn FlushObserver>,
    shared: Arc<Shared>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    delivery: DeliveryPolicy,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
    /// Set once, when shutdown is first observed.
    deadline: Arc<OnceLock<Instant>>,
}

impl Dispatcher {
    /// Detach `buffer` and hand it to the writer according to the policy.
    async fn flush(&self, buffer: &mut Vec<LogRecord>, trigger: FlushTrigger) {
        if buffer.is_empty() {
            return;
        }
        let capacity = buffer.capacity();
        let batch = std::mem::replace(buffer, Vec::with_capacity(capacity));
        self.shared.counters.buffered.store(0, Ordering::Relaxed);
        debug!(batch_size = batch.len(), %trigger, "flushing batch");

        if let DeliveryPolicy::Acknowledged { .. } = self.delivery {
            self.deliver_inline(&batch).await;
            return;
        }

        let permit = match self
            .until_deadline(Arc::clone(&self.permits).acquire_owned())
            .await
        {
            Some(Ok(permit)) => permit,
            // The semaphore is never closed; write inline rather than lose the batch.
            Some(Err(_)) => {
                self.deliver_inline(&batch).await;
                return;
            }
            None => {
                self.record_loss(batch.len(), "no write slot freed up before the shutdown deadline");
                return;
            }
        };

        let counters = &self.shared.counters;
        counters.in_flight_writes.fetch_add(1, Ordering::Relaxed);
        counters.in_flight_records.fetch_add(batch.len(), Ordering::Relaxed);

        let this = self.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            this.deliver(&batch, &AtomicUsize::new(0)).await;
            let counters = &this.shared.counters;
            counters.in_flight_records.fetch_sub(batch.len(), Ordering::Relaxed);
            counters.in_flight_writes.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Write `batch` on the flush loop itself, bounded by the shutdown
    /// deadline once shutdown has started.
    async fn deliver_inline(&self, batch: &[LogRecord]) {
        let settled = AtomicUsize::new(0);
        if self.until_deadline(self.deliver(batch, &settled)).await.is_none() {
            let lost = batch.len() - settled.load(Ordering::Relaxed).min(batch.len());
            self.record_loss(lost, "batch write did not finish before the shutdown deadline");
        }
    }

    /// `settled` counts records already written by this call.
    async fn deliver(&self, batch: &[LogRecord], settled: &AtomicUsize) {
        let counters = &self.shared.counters;
        let (max_retries, mut backoff, max_backoff) = match self.delivery {
            DeliveryPolicy::BestEffort => (0, Duration::ZERO, Duration::ZERO),
            DeliveryPolicy::Acknowledged {
                max_retries,
                initial_backoff,
                max_backoff,
            } => (max_retries, initial_backoff, max_backoff),
        };

        let mut offset = 0;
        let mut attempt = 0;
        loop {
            let remaining = &batch[offset..];
            match self.writer.insert_batch(remaining).await {
                Ok(written) => {
                    counters.flushed_batches.fetch_add(1, Ordering::Relaxed);
                    counters
                        .written_records
                        .fetch_add(written as u64, Ordering::Relaxed);
                    self.observer.on_flush(offset + written);
                    return;
                }
                Err(err) if attempt < max_retries => {
                    let written = err.written.min(remaining.len());
                    counters
                        .written_records
                        .fetch_add(written as u64, Ordering::Relaxed);
                    offset += written;
                    settled.store(offset, Ordering::Relaxed);
                    attempt += 1;
                    warn!(
                        attempt,
                        remaining = batch.len() - offset,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err.source,
                        "batch insert failed, retrying"
                    );
                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, max_backoff);
                }
                Err(err) => {
                    let written = err.written.min(remaining.len());
                    counters
                        .written_records
                        .fetch_add(written as u64, Ordering::Relaxed);
                    counters
                        .failed_records
                        .fetch_add((remaining.len() - written) as u64, Ordering::Relaxed);
                    self.observer.on_failure(remaining, &err);
                    return;
                }
            }
        }
    }

    fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled() || self.shared.shutdown.is_cancelled()
    }

    async fn stopping(&self) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = self.shared.shutdown.cancelled() => {}
        }
    }

    /// Shutdown deadline, fixed the first time it is asked for.
    fn deadline(&self) -> Instant {
        *self
            .deadline
            .get_or_init(|| Instant::now() + self.shutdown_timeout)
    }

    /// Drive `fut` to completion while running. Once shutdown starts it only
    /// gets until the shutdown deadline; `None` means it ran out of time.
    async fn until_deadline<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        if !self.is_stopping() {
            tokio::select! {
                out = &mut fut => return Some(out),
                () = self.stopping() => {}
            }
        }
        timeout_at(self.deadline(), fut).await.ok()
    }

    fn record_loss(&self, lost: usize, reason: &'static str) {
        if lost == 0 {
            return;
        }
        let counters = &self.shared.counters;
        counters.lost_records.fetch_add(lost as u64, Ordering::Relaxed);
        error!(
            lost_records = lost,
            timeout_ms = self.shutdown_timeout.as_millis() as u64,
            reason,
            "records lost during shutdown"
        );
        self.observer.on_shutdown_loss(lost);
    }

    /// Wait for spawned writes; whatever is still running at `deadline` is
    /// counted and logged as lost.
    async fn drain(&self, deadline: Instant) {
        self.tracker.close();
        if timeout_at(deadline, self.tracker.wait()).await.is_ok() {
            return;
        }
        let counters = &self.shared.counters;
        let lost = counters.in_flight_records.load(Ordering::Relaxed);
        counters.lost_records.fetch_add(lost as u64, Ordering::Relaxed);
        error!(
            lost_records = lost,
            in_flight_writes = counters.in_flight_writes.load(Ordering::Relaxed),
            timeout_ms = self.shutdown_timeout.as_millis() as u64,
            "shutdown timed out waiting for batch writes, records may be lost"
        );
        self.observer.on_shutdown_loss(lost);
    }
}
