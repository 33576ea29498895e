//! Event queue
//!
//! Bounded FIFO of pending events. The queue is sharded by user id: events
//! for one user always land in the same shard, so any number of drain
//! workers preserves per-user ordering. Enqueue fails fast with `QueueFull`
//! instead of blocking the ingestion path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::store::event_models::Event;

/// Upper bound on how long a consumer sleeps before rechecking cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Shard {
    tx: mpsc::Sender<Event>,
    rx: Mutex<mpsc::Receiver<Event>>,
}

/// Bounded, sharded event queue.
pub struct EventQueue {
    shards: Vec<Shard>,
}

impl EventQueue {
    /// Total `capacity` is split evenly across `shard_count` shards, with a
    /// floor of one slot per shard.
    pub fn new(capacity: usize, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let per_shard = (capacity / shard_count).max(1);
        let shards = (0..shard_count)
            .map(|_| {
                let (tx, rx) = mpsc::channel(per_shard);
                Shard {
                    tx,
                    rx: Mutex::new(rx),
                }
            })
            .collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, user_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Accept an event or fail fast under back-pressure.
    pub fn enqueue(&self, event: Event) -> AppResult<()> {
        let shard = self.shard_for(&event.user_id);
        match self.shards[shard].tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => Err(AppError::queue_full(format!(
                "event queue at capacity, event {} rejected",
                event.id
            ))),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(AppError::internal("event queue closed"))
            }
        }
    }

    /// Wait up to the polling interval for the next event on a shard.
    ///
    /// Returns `None` when the shard is empty for a full interval or the
    /// token fires, so callers can recheck cancellation promptly.
    pub async fn dequeue(&self, shard: usize, cancel: &CancellationToken) -> Option<Event> {
        let mut rx = self.shards[shard].rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => None,
            received = tokio::time::timeout(POLL_INTERVAL, rx.recv()) => match received {
                Ok(event) => event,
                Err(_) => None,
            },
        }
    }

    /// Number of events currently pending across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.tx.max_capacity() - s.tx.capacity())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
