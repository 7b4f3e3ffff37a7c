//! Newest-ingested-timestamp tracking shared by producers and query threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use occubench_types::Timestamp;

/// Monotonic bound on the data that queries may ask about.
///
/// Producers call [`advance`](Self::advance) with the timestamp of what they
/// just wrote; readers call [`current`](Self::current) without locking.
#[derive(Debug)]
pub struct FreshnessCoordinator {
    update: Mutex<()>,
    current: AtomicU64,
}

impl FreshnessCoordinator {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            update: Mutex::new(()),
            current: AtomicU64::new(initial.as_nanos()),
        }
    }

    /// Moves the bound forward. Older candidates are discarded.
    ///
    /// Returns whether the bound moved.
    pub fn advance(&self, candidate: Timestamp) -> bool {
        let _guard = self.update.lock().unwrap_or_else(PoisonError::into_inner);
        let nanos = candidate.as_nanos();
        if nanos > self.current.load(Ordering::Acquire) {
            self.current.store(nanos, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Timestamp {
        Timestamp::from_nanos(self.current.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn never_moves_backwards() {
        let freshness = FreshnessCoordinator::new(Timestamp::from_secs(100));
        assert!(!freshness.advance(Timestamp::from_secs(50)));
        assert_eq!(freshness.current(), Timestamp::from_secs(100));
        assert!(freshness.advance(Timestamp::from_secs(150)));
        assert!(!freshness.advance(Timestamp::from_secs(150)));
        assert_eq!(freshness.current(), Timestamp::from_secs(150));
    }

    #[test]
    fn concurrent_producers_leave_the_maximum() {
        let freshness = Arc::new(FreshnessCoordinator::new(Timestamp::EPOCH));
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let freshness = Arc::clone(&freshness);
                thread::spawn(move || {
                    let mut last = Timestamp::EPOCH;
                    for i in 0..1_000 {
                        freshness.advance(Timestamp::from_secs(i * 4 + t));
                        let seen = freshness.current();
                        assert!(seen >= last);
                        last = seen;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(freshness.current(), Timestamp::from_secs(3_999));
    }
}
