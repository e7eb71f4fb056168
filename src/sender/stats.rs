//! Lock-free delivery counters.
//!
//! Every counter can be read on its own or read-and-zeroed in one atomic
//! swap, so a periodic reporter never loses increments that land between a
//! read and a reset.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Zeroes the counter, returning the value it held.
    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Point-in-time view of the shipping counters, in records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Handed off to a dispatch worker.
    pub sent: u64,
    /// Entered the dispatch pipeline but could not be delivered.
    pub failed: u64,
    /// Rejected before entering the pipeline.
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_reset_returns_previous_value() {
        let counter = Counter::new();
        counter.add(5);
        counter.increment();
        assert_eq!(counter.get(), 6);
        assert_eq!(counter.reset(), 6);
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.reset(), 0);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counter = Arc::new(Counter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 8000);
    }
}
