//! Event repository
//!
//! Port plus in-memory backing for the raw event log. Query results always
//! come back ordered by `occurred_at` regardless of insertion order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::event_models::Event;
use crate::error::AppResult;

/// Port for the raw event log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Persist a new event. Ids are unique; storing a duplicate id is a
    /// repository error.
    async fn store(&self, event: &Event) -> AppResult<()>;

    /// Fetch a single event.
    async fn get(&self, id: &str) -> AppResult<Option<Event>>;

    /// Page through a user's events, newest first. Returns the page and the
    /// total count for the user.
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<Event>, usize)>;

    /// Page through events of one type (case-insensitive), newest first.
    async fn list_by_type(
        &self,
        event_type: &str,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<Event>, usize)>;

    /// The user's most recent `limit` events in chronological order; this is
    /// the history window the condition evaluator sees.
    async fn recent_for_user(&self, user_id: &str, limit: usize) -> AppResult<Vec<Event>>;

    /// Drop events older than the cutoff. Returns how many were purged.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;
}

/// In-memory event log.
#[derive(Default)]
pub struct MemoryEventRepository {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl EventRepository for MemoryEventRepository {
    async fn store(&self, event: &Event) -> AppResult<()> {
        let mut events = self.events.write().await;
        if events.iter().any(|e| e.id == event.id) {
            return Err(crate::error::AppError::repository(format!(
                "event {} already stored",
                event.id
            )));
        }
        events.push(event.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Event>> {
        let events = self.events.read().await;
        Ok(events.iter().find(|e| e.id == id).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<Event>, usize)> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        let total = matched.len();
        let page = matched.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn list_by_type(
        &self,
        event_type: &str,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<Event>, usize)> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| e.is_type(event_type))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        let total = matched.len();
        let page = matched.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> AppResult<Vec<Event>> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        if matched.len() > limit {
            matched.drain(..matched.len() - limit);
        }
        Ok(matched)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.occurred_at >= cutoff);
        Ok(before - events.len())
    }
}
