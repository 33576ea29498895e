//! Reward history repository
//!
//! Port plus in-memory backing for the append-only reward log. The insert
//! is conditional on the entry id, which is what makes the applier's replay
//! protection work.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::reward_models::RewardHistoryEntry;
use crate::error::AppResult;

/// Port for the reward audit log.
#[async_trait]
pub trait RewardHistoryRepository: Send + Sync {
    /// Append an entry unless its id already exists. Returns `true` when the
    /// entry was written, `false` when the id was already present.
    async fn record(&self, entry: RewardHistoryEntry) -> AppResult<bool>;

    async fn exists(&self, id: &str) -> AppResult<bool>;

    /// Page through a user's entries, newest first, with optional reward-type
    /// and date-range filters. Returns the page and the filtered total.
    async fn list_by_user(
        &self,
        user_id: &str,
        reward_type: Option<&str>,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<RewardHistoryEntry>, usize)>;

    /// All entries awarded inside `[start, end)`, across users, in award
    /// order. The leaderboard time-window aggregation streams this.
    async fn list_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<RewardHistoryEntry>>;
}

/// In-memory reward log.
#[derive(Default)]
pub struct MemoryRewardHistoryRepository {
    inner: RwLock<HistoryStore>,
}

#[derive(Default)]
struct HistoryStore {
    entries: Vec<RewardHistoryEntry>,
    ids: HashSet<String>,
}

impl MemoryRewardHistoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RewardHistoryRepository for MemoryRewardHistoryRepository {
    async fn record(&self, entry: RewardHistoryEntry) -> AppResult<bool> {
        let mut store = self.inner.write().await;
        if !store.ids.insert(entry.id.clone()) {
            return Ok(false);
        }
        store.entries.push(entry);
        Ok(true)
    }

    async fn exists(&self, id: &str) -> AppResult<bool> {
        let store = self.inner.read().await;
        Ok(store.ids.contains(id))
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        reward_type: Option<&str>,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<RewardHistoryEntry>, usize)> {
        let store = self.inner.read().await;
        let mut matched: Vec<RewardHistoryEntry> = store
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| reward_type.is_none_or(|t| e.reward_type.eq_ignore_ascii_case(t)))
            .filter(|e| {
                range.is_none_or(|(start, end)| e.awarded_at >= start && e.awarded_at < end)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.awarded_at.cmp(&a.awarded_at));
        let total = matched.len();
        let page = matched.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn list_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<RewardHistoryEntry>> {
        let store = self.inner.read().await;
        let mut matched: Vec<RewardHistoryEntry> = store
            .entries
            .iter()
            .filter(|e| e.awarded_at >= start && e.awarded_at < end)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.awarded_at.cmp(&b.awarded_at));
        Ok(matched)
    }
}
