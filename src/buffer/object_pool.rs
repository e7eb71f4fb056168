//! Bounded cache of reusable objects.
//!
//! `get` hands out a queued object when one is available and otherwise asks
//! the handler to create one; `put` queues an object back, or hands it to the
//! handler for recycling once the pool is at capacity. Neither call waits on
//! other users of the pool.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;

/// Creation and disposal hooks for pooled objects.
pub trait PoolHandler<T>: Send + Sync {
    /// Creates a fresh object. `None` means nothing could be created right now.
    fn create(&self) -> impl Future<Output = Option<T>> + Send;

    /// Disposes of an object that did not fit back into the pool.
    fn recycle(&self, obj: T);
}

pub struct ObjectPool<T, H> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    handler: H,
}

impl<T, H> ObjectPool<T, H>
where
    T: Send,
    H: PoolHandler<T>,
{
    pub fn new(capacity: usize, handler: H) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            handler,
        }
    }

    pub async fn get(&self) -> Option<T> {
        // The guard must be gone before awaiting the handler
        let queued = self.queue.lock().pop_front();
        match queued {
            Some(obj) => Some(obj),
            None => self.handler.create().await,
        }
    }

    /// Pops a queued object without ever creating one.
    pub fn try_get(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    pub fn put(&self, obj: T) {
        let overflow = {
            let mut queue = self.queue.lock();
            if queue.len() < self.capacity {
                queue.push_back(obj);
                None
            } else {
                Some(obj)
            }
        };

        if let Some(obj) = overflow {
            self.handler.recycle(obj);
        }
    }

    /// Empties the pool, returning everything that was queued.
    pub fn drain(&self) -> Vec<T> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<T, H> std::fmt::Debug for ObjectPool<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.capacity)
            .field("len", &self.queue.lock().len())
            .finish()
    }
}
