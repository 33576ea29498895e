//! Queue processor
//!
//! Long-running workers that drain the event queue: persist the event,
//! evaluate rules, apply rewards. One task per queue shard keeps per-user
//! ordering intact. Failures are per-event: the processor logs and moves on
//! unless it was cancelled.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::queue::EventQueue;
use crate::engine::rewards::RewardApplier;
use crate::engine::rules::RuleEngine;
use crate::error::{AppError, AppResult};
use crate::store::event_models::Event;
use crate::store::event_repos::EventRepository;

/// Drains the queue in the background.
pub struct QueueProcessor {
    inner: Arc<Inner>,
    stop_grace: Duration,
    cancel: Mutex<Option<CancellationToken>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// State shared with the worker tasks.
struct Inner {
    queue: Arc<EventQueue>,
    events: Arc<dyn EventRepository>,
    engine: Arc<RuleEngine>,
    applier: Arc<RewardApplier>,
    running: AtomicBool,
    processed: AtomicU64,
    in_flight: AtomicUsize,
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<EventQueue>,
        events: Arc<dyn EventRepository>,
        engine: Arc<RuleEngine>,
        applier: Arc<RewardApplier>,
        stop_grace: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                queue,
                events,
                engine,
                applier,
                running: AtomicBool::new(false),
                processed: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
            }),
            stop_grace,
            cancel: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Events fully processed since construction. Monotonic.
    pub fn processed_event_count(&self) -> u64 {
        self.inner.processed.load(Ordering::Relaxed)
    }

    /// Whether any worker currently holds an in-flight event.
    pub fn is_processing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Relaxed) > 0
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Relaxed)
    }

    /// Begin draining in the background. Double-start is a no-op.
    pub async fn start(&self, parent: &CancellationToken) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Queue processor already running, ignoring start");
            return;
        }

        let cancel = parent.child_token();
        let mut workers = self.workers.lock().await;
        for shard in 0..self.inner.queue.shard_count() {
            let inner = Arc::clone(&self.inner);
            let token = cancel.clone();
            workers.push(tokio::spawn(async move {
                inner.run_shard(shard, token).await;
            }));
        }
        *self.cancel.lock().await = Some(cancel);
        tracing::info!(
            shards = self.inner.queue.shard_count(),
            "Queue processor started"
        );
    }

    /// Signal cancellation and wait for in-flight events to finish, bounded
    /// by the grace period. Remaining queued events stay queued for a future
    /// start.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            tracing::warn!("Queue processor not running, ignoring stop");
            return;
        }

        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.stop_grace;
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            let abort = worker.abort_handle();
            if tokio::time::timeout_at(deadline, worker).await.is_err() {
                tracing::warn!(
                    grace_seconds = self.stop_grace.as_secs(),
                    "Worker exceeded stop grace period, aborting"
                );
                abort.abort();
            }
        }
        tracing::info!(
            processed = self.processed_event_count(),
            "Queue processor stopped"
        );
    }
}

impl Inner {
    async fn run_shard(&self, shard: usize, cancel: CancellationToken) {
        tracing::debug!(shard, "Shard worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(event) = self.queue.dequeue(shard, &cancel).await else {
                continue;
            };

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let result = self.process_one(&event).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match result {
                Ok(()) => {
                    self.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) if err.is_cancelled() => break,
                Err(err) => {
                    // Per-event failure: log and continue; no redelivery at
                    // this layer.
                    tracing::error!(
                        event.id = %event.id,
                        event.user_id = %event.user_id,
                        error.message = %err,
                        "Event processing failed"
                    );
                    self.processed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        tracing::debug!(shard, "Shard worker exited");
    }

    async fn process_one(&self, event: &Event) -> AppResult<()> {
        // A storage failure is fatal for this event only; skip evaluation so
        // rules never see an unpersisted trigger.
        self.events
            .store(event)
            .await
            .map_err(|err| AppError::repository(format!("storing event {}: {}", event.id, err)))?;

        let instructions = self.engine.evaluate(event).await?;
        if instructions.is_empty() {
            return Ok(());
        }
        let applied = self.applier.apply_all(&instructions).await?;
        tracing::debug!(
            event.id = %event.id,
            instructions = instructions.len(),
            applied,
            "Event processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::store::event_models::NewEvent;
    use crate::store::event_repos::MemoryEventRepository;
    use crate::store::reward_repos::MemoryRewardHistoryRepository;
    use crate::store::rule_models::{Condition, Reward, RuleInput};
    use crate::store::rule_repos::{MemoryRuleRepository, RuleRepository};
    use crate::store::user_repos::{MemoryUserStateRepository, UserStateRepository};
    use crate::store::wallet_repos::MemoryWalletRepository;

    struct Fixture {
        queue: Arc<EventQueue>,
        processor: Arc<QueueProcessor>,
        rules: Arc<MemoryRuleRepository>,
        users: Arc<MemoryUserStateRepository>,
    }

    fn fixture(capacity: usize, workers: usize) -> Fixture {
        let queue = Arc::new(EventQueue::new(capacity, workers));
        let events = MemoryEventRepository::new();
        let rules = MemoryRuleRepository::new();
        let users = MemoryUserStateRepository::new();
        let wallets = MemoryWalletRepository::new();
        let history = MemoryRewardHistoryRepository::new();
        let catalog = Arc::new(Catalog::standard());
        let engine = Arc::new(RuleEngine::new(rules.clone(), events.clone(), 1000, None));
        let applier = Arc::new(RewardApplier::new(users.clone(), wallets, history, catalog));
        let processor = QueueProcessor::new(
            queue.clone(),
            events,
            engine,
            applier,
            Duration::from_secs(5),
        );
        Fixture {
            queue,
            processor,
            rules,
            users,
        }
    }

    fn event(event_type: &str, user_id: &str) -> Event {
        NewEvent {
            event_id: None,
            event_type: event_type.to_string(),
            user_id: user_id.to_string(),
            occurred_at: None,
            attributes: None,
        }
        .into_event()
    }

    async fn seed_points_rule(rules: &MemoryRuleRepository, amount: i64) {
        rules
            .create(
                RuleInput {
                    id: Some("r1".to_string()),
                    name: "award".to_string(),
                    description: String::new(),
                    triggers: vec!["PING".to_string()],
                    conditions: vec![Condition {
                        id: None,
                        condition_type: "alwaysTrue".to_string(),
                        params: Default::default(),
                    }],
                    rewards: vec![Reward {
                        reward_type: "points".to_string(),
                        target_id: "xp".to_string(),
                        amount: Some(amount),
                        params: Default::default(),
                    }],
                    logic: None,
                    history_limit: None,
                    is_active: Some(true),
                }
                .into_rule()
                .unwrap(),
            )
            .await
            .unwrap();
    }

    async fn wait_for_processed(processor: &QueueProcessor, count: u64) {
        for _ in 0..100 {
            if processor.processed_event_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "processor stuck at {} events",
            processor.processed_event_count()
        );
    }

    #[tokio::test]
    async fn test_drains_queue_and_applies_rewards() {
        let f = fixture(100, 1);
        seed_points_rule(&f.rules, 10).await;

        let cancel = CancellationToken::new();
        f.processor.start(&cancel).await;

        f.queue.enqueue(event("PING", "u1")).unwrap();
        f.queue.enqueue(event("PING", "u1")).unwrap();
        wait_for_processed(&f.processor, 2).await;

        let state = f.users.get("u1").await.unwrap().unwrap();
        assert_eq!(state.points("xp"), 20);

        f.processor.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_is_noop() {
        let f = fixture(10, 1);
        let cancel = CancellationToken::new();
        f.processor.start(&cancel).await;
        f.processor.start(&cancel).await;
        assert!(f.processor.is_running());
        f.processor.stop().await;
        assert!(!f.processor.is_running());
    }

    #[tokio::test]
    async fn test_stop_returns_promptly_when_idle() {
        let f = fixture(10, 1);
        let cancel = CancellationToken::new();
        f.processor.start(&cancel).await;

        let started = std::time::Instant::now();
        f.processor.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_events_queued_before_start_survive() {
        let f = fixture(10, 1);
        seed_points_rule(&f.rules, 5).await;

        // Pause/resume: enqueue while no processor runs, then start.
        f.queue.enqueue(event("PING", "u1")).unwrap();
        assert_eq!(f.queue.len(), 1);

        let cancel = CancellationToken::new();
        f.processor.start(&cancel).await;
        wait_for_processed(&f.processor, 1).await;
        assert_eq!(f.users.get("u1").await.unwrap().unwrap().points("xp"), 5);
        f.processor.stop().await;
    }

    #[tokio::test]
    async fn test_per_user_ordering_with_multiple_workers() {
        let f = fixture(64, 4);
        seed_points_rule(&f.rules, 1).await;

        let cancel = CancellationToken::new();
        f.processor.start(&cancel).await;

        for _ in 0..10 {
            f.queue.enqueue(event("PING", "u1")).unwrap();
            f.queue.enqueue(event("PING", "u2")).unwrap();
        }
        wait_for_processed(&f.processor, 20).await;

        assert_eq!(f.users.get("u1").await.unwrap().unwrap().points("xp"), 10);
        assert_eq!(f.users.get("u2").await.unwrap().unwrap().points("xp"), 10);
        f.processor.stop().await;
    }
}
