//! Recycled, fixed-capacity batches of log records.

use super::object_pool::{ObjectPool, PoolHandler};
use crate::domain::LogRecord;
use std::ops::Deref;
use std::sync::Arc;

/// Maximum number of records in one batch.
pub const BATCH_SIZE: usize = 400;

/// Number of idle batch buffers kept around for reuse.
const IDLE_BUFFERS: usize = 64;

struct BatchAllocator {
    batch_size: usize,
}

impl PoolHandler<Vec<LogRecord>> for BatchAllocator {
    async fn create(&self) -> Option<Vec<LogRecord>> {
        Some(Vec::with_capacity(self.batch_size))
    }

    fn recycle(&self, _buffer: Vec<LogRecord>) {
        // Surplus buffers are simply freed
    }
}

type BufferCache = ObjectPool<Vec<LogRecord>, BatchAllocator>;

/// Hands out empty batches and takes their storage back once they are dropped.
#[derive(Clone)]
pub struct BatchBufferPool {
    cache: Arc<BufferCache>,
    batch_size: usize,
}

impl BatchBufferPool {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            cache: Arc::new(ObjectPool::new(
                IDLE_BUFFERS,
                BatchAllocator { batch_size },
            )),
            batch_size,
        }
    }

    /// Returns an empty batch, reusing released storage when possible.
    pub async fn acquire(&self) -> Batch {
        let records = match self.cache.get().await {
            Some(records) => records,
            None => Vec::with_capacity(self.batch_size),
        };
        Batch {
            records,
            max_size: self.batch_size,
            home: Some(self.cache.clone()),
        }
    }

    /// Gives the batch storage back to the pool.
    ///
    /// Dropping a batch does the same thing; this exists for call sites that
    /// want the hand-back to be visible.
    pub fn release(&self, batch: Batch) {
        drop(batch);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn idle_buffers(&self) -> usize {
        self.cache.len()
    }
}

impl Default for BatchBufferPool {
    fn default() -> Self {
        Self::new(BATCH_SIZE)
    }
}

impl std::fmt::Debug for BatchBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBufferPool")
            .field("batch_size", &self.batch_size)
            .field("idle_buffers", &self.cache.len())
            .finish()
    }
}

/// An ordered group of records bounded at a fixed size.
///
/// The storage returns to its pool exactly once, when the batch is dropped.
pub struct Batch {
    records: Vec<LogRecord>,
    max_size: usize,
    home: Option<Arc<BufferCache>>,
}

impl Batch {
    /// Wraps records that do not belong to any pool.
    pub fn detached(records: Vec<LogRecord>) -> Self {
        let max_size = records.len().max(1);
        Self {
            records,
            max_size,
            home: None,
        }
    }

    /// Appends a record, handing it back when the batch is already full.
    pub fn push(&mut self, record: LogRecord) -> Result<(), LogRecord> {
        if self.is_full() {
            return Err(record);
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Capacity of the underlying storage.
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Address of the underlying storage, used to observe reuse.
    pub fn storage_ptr(&self) -> *const LogRecord {
        self.records.as_ptr()
    }
}

impl Deref for Batch {
    type Target = [LogRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            let mut records = std::mem::take(&mut self.records);
            records.clear();
            home.put(records);
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("len", &self.records.len())
            .field("max_size", &self.max_size)
            .field("pooled", &self.home.is_some())
            .finish()
    }
}
