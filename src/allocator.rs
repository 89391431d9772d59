//! Blob identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one published blob.
///
/// Ids start at 0 and are never reused within a process, even after the
/// blob they named has expired.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlobId(u64);

impl BlobId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Name of the storage entry holding this blob: the decimal id.
    pub fn storage_key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out [`BlobId`]s in strictly increasing order.
///
/// Allocation is a single atomic increment and never awaits, so concurrent
/// request tasks can share one allocator without a lock.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> BlobId {
        BlobId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_at_zero_and_increments() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), BlobId::new(0));
        assert_eq!(ids.next(), BlobId::new(1));
        assert_eq!(ids.next(), BlobId::new(2));
    }

    #[test]
    fn storage_key_is_decimal_id() {
        assert_eq!(BlobId::new(0).storage_key(), "0");
        assert_eq!(BlobId::new(1234).storage_key(), "1234");
        assert_eq!(BlobId::new(77).to_string(), "77");
    }

    #[test]
    fn concurrent_callers_never_share_an_id() {
        let ids = Arc::new(IdAllocator::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..500).map(|_| ids.next().get()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            let batch = worker.join().unwrap();
            // each caller observes its own ids in increasing order
            assert!(batch.windows(2).all(|w| w[0] < w[1]));
            for id in batch {
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 4000);
        assert_eq!(seen.iter().max(), Some(&3999));
    }
}
