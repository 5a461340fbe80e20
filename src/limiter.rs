// src/limiter.rs
// =============================================================================
// The concurrency limiter: an admission gate for file downloads.
//
// It is a counting semaphore. A download attempt acquires one slot before it
// opens its request and gives it back when the body has been written (or the
// attempt failed). The existence check and the backoff sleep happen outside
// the gate, so tasks that are only waiting never hold a slot.
//
// This is independent of the fetch client's connection ceiling; the two
// together bound total resource usage.
//
// Rust concepts:
// - Arc: shared ownership between many tasks
// - RAII: the permit releases its slot when dropped
// - Atomics: lock-free counters readable from any task
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct LimiterStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    total_acquired: AtomicUsize,
}

/// Counting admission gate. Cheap to clone; clones share the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<LimiterStats>,
}

/// One occupied slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<LimiterStats>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats: Arc::new(LimiterStats::default()),
        }
    }

    // Waits until a slot is free and takes it.
    //
    // Only fails if the semaphore was closed, which the engine never does.
    pub async fn acquire(&self) -> Result<LimiterPermit, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;

        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);
        self.stats.total_acquired.fetch_add(1, Ordering::SeqCst);

        Ok(LimiterPermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at the same time.
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// How many times a slot was handed out.
    pub fn total_acquired(&self) -> usize {
        self.stats.total_acquired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);

        let first = limiter.acquire().await.unwrap();
        let second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);

        drop(first);
        assert_eq!(limiter.in_flight(), 1);
        drop(second);
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.total_acquired(), 2);
    }

    #[tokio::test]
    async fn test_acquire_blocks_when_full() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(waiting.is_err(), "second acquire should wait for a free slot");

        drop(held);
        let next = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn test_peak_never_exceeds_capacity() {
        let limiter = ConcurrencyLimiter::new(3);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    let _permit = limiter.acquire().await.unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(limiter.peak() <= 3);
        assert_eq!(limiter.total_acquired(), 20);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(ConcurrencyLimiter::new(0).capacity(), 1);
    }
}
