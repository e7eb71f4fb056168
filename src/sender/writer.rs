//! Ingestion front door: bounded queue, optional rate limit and the batching
//! loop feeding the dispatch pool.

use super::pool::{DispatchPool, PoolError};
use super::stats::{Counter, StatsSnapshot};
use crate::buffer::{Batch, BatchBufferPool, TokenBucket};
use crate::domain::{Backend, LogRecord};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_BUFFER_SIZE: usize = 5000;

/// Longest the batching loop waits on an empty queue before checking in.
const IDLE_TIMEOUT: Duration = Duration::from_millis(50);

/// Why a record was refused. Every variant counts as one dropped record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    #[error("Writer is closed")]
    Closed,

    #[error("Flow limited")]
    FlowLimited,

    #[error("Buffer full")]
    BufferFull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub concurrency: usize,
    /// Capacity of the ingestion queue, in records.
    pub buffer_size: usize,
    /// Records per second; zero or negative disables the limit.
    pub rate_limit: i64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            rate_limit: -1,
        }
    }
}

pub struct Writer {
    queue: mpsc::Sender<LogRecord>,
    limiter: Option<TokenBucket>,
    pool: DispatchPool,
    buffers: BatchBufferPool,
    closed: AtomicBool,
    shutdown: CancellationToken,
    batcher: Mutex<Option<JoinHandle<()>>>,
    dropped: Counter,
}

impl Writer {
    /// Builds the pipeline and starts the batching loop on the current Tokio
    /// runtime.
    ///
    /// An empty backend list ships to a single black hole with one worker.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(backends: Vec<Backend>, config: WriterConfig) -> Result<Self, PoolError> {
        if config.buffer_size < 1 {
            return Err(PoolError::InvalidBufferSize(config.buffer_size));
        }

        let pool = if backends.is_empty() {
            warn!("No backend configured, log records will be discarded");
            DispatchPool::new(vec![Backend::black_hole()], 1)?
        } else {
            DispatchPool::new(backends, config.concurrency)?
        };

        let limiter =
            (config.rate_limit > 0).then(|| TokenBucket::per_second(config.rate_limit as u64));
        let (queue, receiver) = mpsc::channel(config.buffer_size);
        let buffers = BatchBufferPool::default();
        let shutdown = CancellationToken::new();

        let batcher = tokio::spawn(run_batcher(
            receiver,
            pool.clone(),
            buffers.clone(),
            shutdown.clone(),
        ));

        info!(
            "Writer started: backends={:?}, concurrency={}, buffer_size={}, rate_limit={}",
            pool.backends().iter().map(ToString::to_string).collect::<Vec<_>>(),
            pool.concurrency(),
            config.buffer_size,
            config.rate_limit
        );

        Ok(Self {
            queue,
            limiter,
            pool,
            buffers,
            closed: AtomicBool::new(false),
            shutdown,
            batcher: Mutex::new(Some(batcher)),
            dropped: Counter::new(),
        })
    }

    /// Queues one record without ever waiting.
    pub fn write(&self, record: LogRecord) -> Result<(), WriteError> {
        if self.closed.load(Ordering::Acquire) {
            self.dropped.increment();
            return Err(WriteError::Closed);
        }

        if let Some(limiter) = &self.limiter
            && !limiter.try_acquire()
        {
            self.dropped.increment();
            return Err(WriteError::FlowLimited);
        }

        match self.queue.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.increment();
                Err(WriteError::BufferFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.increment();
                Err(WriteError::Closed)
            }
        }
    }

    /// Refuses further records, ships what is already queued, then closes the
    /// dispatch pool once its workers are done.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        let batcher = self.batcher.lock().take();
        if let Some(batcher) = batcher
            && let Err(e) = batcher.await
        {
            error!("Batching loop terminated abnormally: {}", e);
        }

        self.pool.close().await;
        info!("Writer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Records waiting in the ingestion queue.
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    pub fn pool(&self) -> &DispatchPool {
        &self.pool
    }

    pub fn batch_size(&self) -> usize {
        self.buffers.batch_size()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn reset_dropped(&self) -> u64 {
        self.dropped.reset()
    }

    pub fn sent(&self) -> u64 {
        self.pool.sent()
    }

    pub fn reset_sent(&self) -> u64 {
        self.pool.reset_sent()
    }

    pub fn failed(&self) -> u64 {
        self.pool.failed()
    }

    pub fn reset_failed(&self) -> u64 {
        self.pool.reset_failed()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent(),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }

    /// Reads and zeroes all three counters.
    pub fn take_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.reset_sent(),
            failed: self.reset_failed(),
            dropped: self.reset_dropped(),
        }
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("pool", &self.pool)
            .field("closed", &self.is_closed())
            .field("queued", &self.queued())
            .finish()
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Moves everything currently queued into the batch, stopping when it is
/// full or the queue is momentarily empty.
fn fill_batch(receiver: &mut mpsc::Receiver<LogRecord>, batch: &mut Batch) {
    while !batch.is_full() {
        match receiver.try_recv() {
            Ok(record) => {
                if batch.push(record).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

async fn run_batcher(
    mut receiver: mpsc::Receiver<LogRecord>,
    pool: DispatchPool,
    buffers: BatchBufferPool,
    shutdown: CancellationToken,
) {
    info!("Batching loop started");

    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = timeout(IDLE_TIMEOUT, receiver.recv()) => match received {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(_) => continue,
            },
        };

        let mut batch = buffers.acquire().await;
        if let Err(record) = batch.push(first) {
            warn!("Batch rejected record from stream {}", record.name);
            continue;
        }
        fill_batch(&mut receiver, &mut batch);
        pool.send(batch).await;
    }

    // Ship what made it into the queue before the close
    receiver.close();
    let mut flushed = 0usize;
    loop {
        let mut batch = buffers.acquire().await;
        fill_batch(&mut receiver, &mut batch);
        if batch.is_empty() {
            break;
        }
        flushed += batch.len();
        pool.send(batch).await;
    }

    info!("Batching loop stopped ({} records flushed on close)", flushed);
}
