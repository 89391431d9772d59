//! Scheduled deletion of expired blobs.
//!
//! A single background task owns a [`DelayQueue`] of armed deadlines.
//! [`ExpiryScheduler`] handles send it new deadlines over a channel, so the
//! wait for a blob outlives the request that created it. When a deadline
//! passes the blob is removed from the store in its own task, so many
//! deletions can be in flight at once.
//!
//! Nothing cancels or reschedules an armed deletion. If the process exits
//! first, the blob is simply never deleted.
//!
//! Outcomes are reported twice: as `tracing` events, and as
//! [`ExpiryEvent`]s on a broadcast channel for anyone who
//! [subscribes](ExpiryScheduler::subscribe). Failed deletions are not retried.

use std::future::poll_fn;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info};

use crate::allocator::BlobId;
use crate::store::BlobStore;

/// How long a blob lives after its publish response was sent.
pub const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

const EVENT_CAPACITY: usize = 1024;

/// Outcome of one scheduled deletion.
#[derive(Clone, Debug)]
pub enum ExpiryEvent {
    Deleted { id: BlobId },
    Failed { id: BlobId, error: Arc<io::Error> },
}

impl ExpiryEvent {
    pub fn id(&self) -> BlobId {
        match self {
            Self::Deleted { id } | Self::Failed { id, .. } => *id,
        }
    }
}

#[derive(Debug)]
struct Arm {
    id: BlobId,
    deadline: Instant,
}

/// Handle to the background expiry task. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ExpiryScheduler {
    commands: mpsc::UnboundedSender<Arm>,
    events: broadcast::Sender<ExpiryEvent>,
    pending: Arc<AtomicUsize>,
    retention: Duration,
}

impl ExpiryScheduler {
    /// Starts the expiry task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(store: Arc<dyn BlobStore>, retention: Duration) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run(store, inbox, events.clone(), Arc::clone(&pending)));

        Self { commands, events, pending, retention }
    }

    /// Arms deletion of `id` one retention window from now and returns the
    /// deadline.
    pub fn schedule(&self, id: BlobId) -> Instant {
        let deadline = Instant::now() + self.retention;
        self.pending.fetch_add(1, Ordering::Relaxed);

        if self.commands.send(Arm { id, deadline }).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            error!(%id, "expiry task is not running, blob will not be deleted");
        } else {
            debug!(%id, retention_secs = self.retention.as_secs_f64(), "expiry armed");
        }
        deadline
    }

    /// Deletions armed but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Receives every [`ExpiryEvent`] produced after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ExpiryEvent> {
        self.events.subscribe()
    }
}

async fn run(
    store: Arc<dyn BlobStore>,
    mut inbox: mpsc::UnboundedReceiver<Arm>,
    events: broadcast::Sender<ExpiryEvent>,
    pending: Arc<AtomicUsize>,
) {
    let mut queue = DelayQueue::new();
    let mut deletions = JoinSet::new();
    // False once every scheduler handle has been dropped. `recv` would keep
    // returning `None` after that, so its branch is switched off.
    let mut accepting = true;

    loop {
        tokio::select! {
            arm = inbox.recv(), if accepting => match arm {
                Some(Arm { id, deadline }) => {
                    queue.insert_at(id, deadline);
                }
                // Every handle is gone. Keep going until the queue drains.
                None => accepting = false,
            },

            // An empty DelayQueue reports `Ready(None)` instead of waiting,
            // which would spin this loop. Only poll it when something is armed.
            Some(expired) = poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                let id = expired.into_inner();
                let store = Arc::clone(&store);
                let events = events.clone();
                let pending = Arc::clone(&pending);

                deletions.spawn(async move {
                    let event = match store.remove(id).await {
                        Ok(()) => {
                            info!(%id, "blob expired");
                            ExpiryEvent::Deleted { id }
                        }
                        Err(e) => {
                            error!(%id, error = %e, "failed to delete expired blob");
                            ExpiryEvent::Failed { id, error: Arc::new(e) }
                        }
                    };
                    pending.fetch_sub(1, Ordering::Relaxed);
                    // No subscribers is fine.
                    let _ = events.send(event);
                });
            }

            // Reaps finished deletions so the set stays small, and surfaces
            // panics inside the store.
            Some(joined) = deletions.join_next(), if !deletions.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "deletion task aborted");
                }
            }

            // No handles, nothing armed, nothing deleting.
            else => break,
        }
    }

    debug!("expiry task stopped");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::store::MemoryStore;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    async fn seeded(ids: &[u64]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for &id in ids {
            store.put(BlobId::new(id), Bytes::from_static(b"blob")).await.unwrap();
        }
        store
    }

    #[test]
    fn retention_is_one_day() {
        assert_eq!(RETENTION.as_millis(), 86_400_000);
    }

    #[tokio::test(start_paused = true)]
    async fn blob_survives_until_deadline_then_is_deleted() {
        let store = seeded(&[0]).await;
        let expiry = ExpiryScheduler::spawn(store.clone(), RETENTION);
        let mut events = expiry.subscribe();

        let armed_at = Instant::now();
        let deadline = expiry.schedule(BlobId::new(0));
        assert_eq!(deadline - armed_at, RETENTION);
        assert_eq!(expiry.pending(), 1);

        tokio::time::sleep(RETENTION - Duration::from_secs(1)).await;
        assert!(store.get(BlobId::new(0)).is_some());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, ExpiryEvent::Deleted { id } if id == BlobId::new(0)));
        assert!(Instant::now() >= deadline);
        assert!(store.get(BlobId::new(0)).is_none());
        assert_eq!(expiry.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn each_blob_waits_its_own_retention_window() {
        let store = seeded(&[0, 1]).await;
        let expiry = ExpiryScheduler::spawn(store.clone(), 2 * HOUR);
        let mut events = expiry.subscribe();

        expiry.schedule(BlobId::new(0));
        tokio::time::sleep(HOUR).await;
        expiry.schedule(BlobId::new(1));
        assert_eq!(expiry.pending(), 2);

        assert_eq!(events.recv().await.unwrap().id(), BlobId::new(0));
        assert!(store.get(BlobId::new(1)).is_some());
        assert_eq!(events.recv().await.unwrap().id(), BlobId::new(1));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_entry_is_reported_not_retried() {
        let store = seeded(&[]).await;
        let expiry = ExpiryScheduler::spawn(store, HOUR);
        let mut events = expiry.subscribe();

        expiry.schedule(BlobId::new(9));

        match events.recv().await.unwrap() {
            ExpiryEvent::Failed { id, error } => {
                assert_eq!(id, BlobId::new(9));
                assert_eq!(error.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(expiry.pending(), 0);

        tokio::time::sleep(10 * HOUR).await;
        assert!(events.try_recv().is_err());
    }

    struct SlowStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl BlobStore for SlowStore {
        async fn put(&self, id: BlobId, content: Bytes) -> io::Result<()> {
            self.inner.put(id, content).await
        }

        async fn remove(&self, id: BlobId) -> io::Result<()> {
            // Even ids take longer to delete than odd ones.
            if id.get() % 2 == 0 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.inner.remove(id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_deletion_does_not_hold_up_others() {
        let store = Arc::new(SlowStore { inner: MemoryStore::new() });
        for id in 0..2 {
            store.put(BlobId::new(id), Bytes::new()).await.unwrap();
        }
        let expiry = ExpiryScheduler::spawn(store, HOUR);
        let mut events = expiry.subscribe();

        expiry.schedule(BlobId::new(0));
        expiry.schedule(BlobId::new(1));

        assert_eq!(events.recv().await.unwrap().id(), BlobId::new(1));
        assert_eq!(events.recv().await.unwrap().id(), BlobId::new(0));
    }
}
