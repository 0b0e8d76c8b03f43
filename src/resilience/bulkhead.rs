//! Bulkhead: a hard cap on concurrent in-flight attempts toward one upstream.
//!
//! # Responsibilities
//! - Track in-flight attempts for a single upstream
//! - Admit an attempt only while the count is below the limit
//! - Release the slot exactly once when the attempt finishes
//!
//! # Design Decisions
//! - One instance per client/upstream pair, never global
//! - Rejects immediately when full; callers are never queued
//! - Release is tied to a RAII permit so every exit path gives the slot back

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Counting semaphore with non-blocking acquisition.
#[derive(Debug)]
pub struct Bulkhead {
    name: String,
    limit: usize,
    in_flight: AtomicUsize,
}

impl Bulkhead {
    /// Create a bulkhead admitting at most `limit` concurrent attempts.
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        Self {
            name: name.into(),
            limit,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current number of admitted attempts.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Try to take one slot. Returns `None` when the bulkhead is full.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BulkheadPermit> {
        let mut prev = self.in_flight.load(Ordering::Acquire);
        loop {
            if prev >= self.limit {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
        metrics::record_bulkhead_in_flight(&self.name, prev + 1);
        Some(BulkheadPermit {
            bulkhead: Arc::clone(self),
        })
    }

    fn release(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "bulkhead released more often than acquired");
        metrics::record_bulkhead_in_flight(&self.name, prev.saturating_sub(1));
    }
}

/// A RAII guard holding one bulkhead slot.
#[derive(Debug)]
pub struct BulkheadPermit {
    bulkhead: Arc<Bulkhead>,
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.bulkhead.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn rejects_when_full_and_frees_on_drop() {
        let bulkhead = Arc::new(Bulkhead::new("users", 2));

        let a = bulkhead.try_acquire().unwrap();
        let _b = bulkhead.try_acquire().unwrap();
        assert!(bulkhead.try_acquire().is_none());
        assert_eq!(bulkhead.in_flight(), 2);

        drop(a);
        assert_eq!(bulkhead.in_flight(), 1);
        assert!(bulkhead.try_acquire().is_some());
    }

    #[test]
    fn concurrent_acquisitions_never_exceed_limit() {
        let bulkhead = Arc::new(Bulkhead::new("users", 3));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let bulkhead = bulkhead.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    bulkhead.try_acquire()
                })
            })
            .collect();

        let permits: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(permits.len(), 3);
        assert_eq!(bulkhead.in_flight(), 3);
        drop(permits);
        assert_eq!(bulkhead.in_flight(), 0);
    }
}
