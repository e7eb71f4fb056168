//! Bounded pool of dispatch workers sharing a cache of backend transports.

use super::stats::Counter;
use super::transport::Transport;
use crate::buffer::{Batch, ObjectPool, PoolHandler};
use crate::domain::Backend;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How many times a worker tries to obtain a usable transport per batch.
pub const TRANSPORT_ATTEMPTS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("At least one backend is required")]
    NoBackends,

    #[error("Concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("Buffer size must be at least 1, got {0}")]
    InvalidBufferSize(usize),
}

/// Creates transports to a randomly chosen backend and closes the ones the
/// cache has no room for.
struct TransportFactory {
    backends: Arc<[Backend]>,
    closed: Arc<AtomicBool>,
}

impl TransportFactory {
    fn pick_backend(&self) -> &Backend {
        let index = rand::rng().random_range(0..self.backends.len());
        &self.backends[index]
    }
}

impl PoolHandler<Transport> for TransportFactory {
    async fn create(&self) -> Option<Transport> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let backend = self.pick_backend();
        match Transport::connect(backend).await {
            Ok(transport) => {
                debug!("Connected to backend {}", backend);
                Some(transport)
            }
            Err(e) => {
                warn!("Failed to connect to backend {}: {}", backend, e);
                None
            }
        }
    }

    fn recycle(&self, mut transport: Transport) {
        transport.close();
    }
}

struct PoolInner {
    backends: Arc<[Backend]>,
    concurrency: usize,
    workers: Arc<Semaphore>,
    tracker: TaskTracker,
    transports: ObjectPool<Transport, TransportFactory>,
    closed: Arc<AtomicBool>,
    sent: Counter,
    failed: Counter,
}

impl PoolInner {
    async fn acquire_transport(&self) -> Option<Transport> {
        for attempt in 1..=TRANSPORT_ATTEMPTS {
            match self.transports.get().await {
                Some(transport) if !transport.is_closed() => return Some(transport),
                Some(mut transport) => {
                    debug!("Discarding closed {:?} transport", transport.kind());
                    transport.close();
                }
                None => debug!("No transport available (attempt {})", attempt),
            }
        }
        None
    }

    async fn deliver(&self, batch: Batch) {
        let count = batch.len() as u64;

        let Some(mut transport) = self.acquire_transport().await else {
            warn!("No backend available, {} records lost", count);
            self.failed.add(count);
            return;
        };

        if transport.send(&batch).await {
            self.transports.put(transport);
        } else {
            transport.close();
            self.failed.add(count);
        }
    }
}

/// Hands batches to at most `concurrency` concurrent workers.
///
/// `sent` counts records at hand-off while `failed` counts records that
/// could not be delivered afterwards, so one batch can show up in both.
#[derive(Clone)]
pub struct DispatchPool {
    inner: Arc<PoolInner>,
}

impl DispatchPool {
    pub fn new(backends: Vec<Backend>, concurrency: usize) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::NoBackends);
        }
        if concurrency < 1 {
            return Err(PoolError::InvalidConcurrency(concurrency));
        }

        let backends: Arc<[Backend]> = backends.into();
        let closed = Arc::new(AtomicBool::new(false));
        let factory = TransportFactory {
            backends: backends.clone(),
            closed: closed.clone(),
        };

        Ok(Self {
            inner: Arc::new(PoolInner {
                backends,
                concurrency,
                workers: Arc::new(Semaphore::new(concurrency)),
                tracker: TaskTracker::new(),
                transports: ObjectPool::new(concurrency, factory),
                closed,
                sent: Counter::new(),
                failed: Counter::new(),
            }),
        })
    }

    /// Submits a batch to a worker, waiting for a free worker slot.
    ///
    /// Returns false when the pool is closed; the batch is then counted as
    /// failed and its storage released.
    pub async fn send(&self, batch: Batch) -> bool {
        let count = batch.len() as u64;
        if self.is_closed() {
            self.inner.failed.add(count);
            return false;
        }

        let Ok(permit) = self.inner.workers.clone().acquire_owned().await else {
            self.inner.failed.add(count);
            return false;
        };
        self.spawn_worker(permit, batch, count)
    }

    /// Like [`send`](Self::send) but rejects the batch instead of waiting
    /// when every worker is busy.
    pub fn try_send(&self, batch: Batch) -> bool {
        let count = batch.len() as u64;
        if self.is_closed() {
            self.inner.failed.add(count);
            return false;
        }

        let Ok(permit) = self.inner.workers.clone().try_acquire_owned() else {
            self.inner.failed.add(count);
            return false;
        };
        self.spawn_worker(permit, batch, count)
    }

    fn spawn_worker(
        &self,
        permit: tokio::sync::OwnedSemaphorePermit,
        batch: Batch,
        count: u64,
    ) -> bool {
        let inner = self.inner.clone();
        self.inner.tracker.spawn(async move {
            let _permit = permit;
            inner.deliver(batch).await;
        });
        self.inner.sent.add(count);
        true
    }

    /// Stops accepting batches, waits for in-flight workers, then closes
    /// every cached transport.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.workers.close();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let mut transports = self.inner.transports.drain();
        for transport in &mut transports {
            transport.close();
        }
        info!(
            "Dispatch pool closed ({} transports released)",
            transports.len()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn backends(&self) -> &[Backend] {
        &self.inner.backends
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    pub fn idle_transports(&self) -> usize {
        self.inner.transports.len()
    }

    pub fn sent(&self) -> u64 {
        self.inner.sent.get()
    }

    pub fn reset_sent(&self) -> u64 {
        self.inner.sent.reset()
    }

    pub fn failed(&self) -> u64 {
        self.inner.failed.get()
    }

    pub fn reset_failed(&self) -> u64 {
        self.inner.failed.reset()
    }
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("backends", &self.inner.backends)
            .field("concurrency", &self.inner.concurrency)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendKind, LogRecord};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn batch_of(n: usize) -> Batch {
        Batch::detached(
            (0..n)
                .map(|i| LogRecord::new("web", format!("line {i}")))
                .collect(),
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_construction_rejects_empty_backends() {
        assert_eq!(
            DispatchPool::new(Vec::new(), 1).unwrap_err(),
            PoolError::NoBackends
        );
    }

    #[test]
    fn test_construction_rejects_zero_concurrency() {
        assert_eq!(
            DispatchPool::new(vec![Backend::black_hole()], 0).unwrap_err(),
            PoolError::InvalidConcurrency(0)
        );
    }

    #[tokio::test]
    async fn test_black_hole_counts_sent() {
        let pool = DispatchPool::new(vec![Backend::black_hole()], 2).unwrap();

        assert!(pool.send(batch_of(5)).await);
        assert!(pool.send(batch_of(3)).await);
        pool.close().await;

        assert_eq!(pool.sent(), 8);
        assert_eq!(pool.failed(), 0);
    }

    #[tokio::test]
    async fn test_send_after_close_counts_failed() {
        let pool = DispatchPool::new(vec![Backend::black_hole()], 1).unwrap();
        pool.close().await;

        assert!(!pool.send(batch_of(4)).await);
        assert!(!pool.try_send(batch_of(2)));
        assert_eq!(pool.sent(), 0);
        assert_eq!(pool.failed(), 6);
    }

    #[tokio::test]
    async fn test_unreachable_backend_counts_both_sent_and_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let backend = Backend::new(BackendKind::Tcp, "127.0.0.1", port);
        let pool = DispatchPool::new(vec![backend], 1).unwrap();

        assert!(pool.send(batch_of(7)).await);
        pool.close().await;

        assert_eq!(pool.sent(), 7);
        assert_eq!(pool.failed(), 7);
    }

    #[tokio::test]
    async fn test_transport_is_reused_between_batches() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = Backend::new(BackendKind::Tcp, "127.0.0.1", port);
        let pool = DispatchPool::new(vec![backend], 1).unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while received.len() < 4 {
                match lines.next_line().await.unwrap() {
                    Some(line) => received.push(line),
                    None => break,
                }
            }
            received
        });

        assert!(pool.send(batch_of(2)).await);
        wait_until(|| pool.idle_transports() == 1).await;
        assert!(pool.send(batch_of(2)).await);

        let received = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.len(), 4);
        pool.close().await;
        assert_eq!(pool.failed(), 0);
        assert_eq!(pool.idle_transports(), 0);
    }

    async fn closed_transport() -> Transport {
        let mut transport = Transport::connect(&Backend::black_hole()).await.unwrap();
        transport.close();
        transport
    }

    #[tokio::test]
    async fn test_closed_pooled_transport_is_replaced() {
        let pool = DispatchPool::new(vec![Backend::black_hole()], 1).unwrap();
        pool.inner.transports.put(closed_transport().await);
        assert_eq!(pool.idle_transports(), 1);

        pool.inner.deliver(batch_of(3)).await;

        assert_eq!(pool.failed(), 0);
        let pooled = pool.inner.transports.try_get().unwrap();
        assert!(!pooled.is_closed());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_gives_up_after_transport_attempts() {
        let pool = DispatchPool::new(vec![Backend::black_hole()], TRANSPORT_ATTEMPTS).unwrap();
        for _ in 0..TRANSPORT_ATTEMPTS {
            pool.inner.transports.put(closed_transport().await);
        }

        pool.inner.deliver(batch_of(4)).await;

        assert_eq!(pool.failed(), 4);
        assert_eq!(pool.idle_transports(), 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_counters_reset_independently() {
        let pool = DispatchPool::new(vec![Backend::black_hole()], 1).unwrap();
        pool.close().await;
        pool.send(batch_of(3)).await;

        assert_eq!(pool.reset_sent(), 0);
        assert_eq!(pool.reset_failed(), 3);
        assert_eq!(pool.failed(), 0);
    }
}
