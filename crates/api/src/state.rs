//! Application state shared across handlers
//!
//! The composition root: repositories, the catalog, the queue, and the
//! engines are constructed here and wired by explicit ownership. No
//! module-level mutable state exists anywhere in the crate.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::engine::leaderboard::LeaderboardEngine;
use crate::engine::processor::QueueProcessor;
use crate::engine::queue::EventQueue;
use crate::engine::rewards::RewardApplier;
use crate::engine::rules::RuleEngine;
use crate::engine::sandbox::Sandbox;
use crate::store::event_repos::{EventRepository, MemoryEventRepository};
use crate::store::reward_repos::{MemoryRewardHistoryRepository, RewardHistoryRepository};
use crate::store::rule_repos::{MemoryRuleRepository, RuleRepository};
use crate::store::user_repos::{MemoryUserStateRepository, UserStateRepository};
use crate::store::wallet_repos::{MemoryWalletRepository, WalletRepository};

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Immutable descriptor catalog
    pub catalog: Arc<Catalog>,
    /// Repository ports (in-memory backing)
    pub events: Arc<dyn EventRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub users: Arc<dyn UserStateRepository>,
    pub rewards: Arc<dyn RewardHistoryRepository>,
    pub wallets: Arc<dyn WalletRepository>,
    /// Ingestion queue
    pub queue: Arc<EventQueue>,
    /// Pipeline components
    pub engine: Arc<RuleEngine>,
    pub applier: Arc<RewardApplier>,
    pub processor: Arc<QueueProcessor>,
    pub sandbox: Arc<Sandbox>,
    pub leaderboards: Arc<LeaderboardEngine>,
}

impl AppState {
    /// Create application state with the stock catalog.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_catalog(config, Catalog::standard())
    }

    /// Create application state with an explicit catalog (used by the
    /// composition root and by tests that need custom descriptors).
    pub fn with_catalog(config: &AppConfig, catalog: Catalog) -> Self {
        let catalog = Arc::new(catalog);

        let events: Arc<dyn EventRepository> = MemoryEventRepository::new();
        let rules: Arc<dyn RuleRepository> = MemoryRuleRepository::new();
        let users: Arc<dyn UserStateRepository> = MemoryUserStateRepository::new();
        let rewards: Arc<dyn RewardHistoryRepository> = MemoryRewardHistoryRepository::new();
        let wallets: Arc<dyn WalletRepository> = MemoryWalletRepository::new();

        let queue = Arc::new(EventQueue::new(
            config.queue.capacity,
            config.queue.workers,
        ));
        let engine = Arc::new(RuleEngine::new(
            rules.clone(),
            events.clone(),
            config.engine.history_limit,
            None,
        ));
        let applier = Arc::new(RewardApplier::new(
            users.clone(),
            wallets.clone(),
            rewards.clone(),
            catalog.clone(),
        ));
        let processor = QueueProcessor::new(
            queue.clone(),
            events.clone(),
            engine.clone(),
            applier.clone(),
            Duration::from_secs(config.queue.stop_grace_seconds),
        );
        let sandbox = Arc::new(Sandbox::new(
            rules.clone(),
            engine.clone(),
            catalog.clone(),
        ));
        let leaderboards = Arc::new(LeaderboardEngine::new(
            users.clone(),
            rewards.clone(),
            Duration::from_secs(config.leaderboard.cache_ttl_seconds),
        ));

        tracing::info!(
            queue.capacity = config.queue.capacity,
            queue.workers = config.queue.workers,
            engine.history_limit = config.engine.history_limit,
            "Application state created"
        );

        Self {
            config: Arc::new(config.clone()),
            catalog,
            events,
            rules,
            users,
            rewards,
            wallets,
            queue,
            engine,
            applier,
            processor,
            sandbox,
            leaderboards,
        }
    }
}
