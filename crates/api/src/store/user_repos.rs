//! User state repository
//!
//! Port plus in-memory backing for per-user aggregates. Single-user reads
//! and writes appear atomic behind the map lock; the sharded processor
//! guarantees a single writer per user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::user_models::UserState;
use crate::error::AppResult;

/// Port for per-user aggregate state.
#[async_trait]
pub trait UserStateRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> AppResult<Option<UserState>>;

    /// Fetch the aggregate, creating an empty one on first touch.
    async fn get_or_create(&self, user_id: &str) -> AppResult<UserState>;

    /// Persist a mutated aggregate, bumping `updated_at`.
    async fn save(&self, state: UserState) -> AppResult<UserState>;

    /// Every known user state; the leaderboard alltime projection reads this.
    async fn list_all(&self) -> AppResult<Vec<UserState>>;
}

/// In-memory user state store.
#[derive(Default)]
pub struct MemoryUserStateRepository {
    states: RwLock<HashMap<String, UserState>>,
}

impl MemoryUserStateRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl UserStateRepository for MemoryUserStateRepository {
    async fn get(&self, user_id: &str) -> AppResult<Option<UserState>> {
        let states = self.states.read().await;
        Ok(states.get(user_id).cloned())
    }

    async fn get_or_create(&self, user_id: &str) -> AppResult<UserState> {
        {
            let states = self.states.read().await;
            if let Some(state) = states.get(user_id) {
                return Ok(state.clone());
            }
        }
        let mut states = self.states.write().await;
        Ok(states
            .entry(user_id.to_string())
            .or_insert_with(|| UserState::new(user_id))
            .clone())
    }

    async fn save(&self, mut state: UserState) -> AppResult<UserState> {
        let mut states = self.states.write().await;
        state.updated_at = Utc::now();
        states.insert(state.user_id.clone(), state.clone());
        Ok(state)
    }

    async fn list_all(&self) -> AppResult<Vec<UserState>> {
        let states = self.states.read().await;
        let mut all: Vec<UserState> = states.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let repo = MemoryUserStateRepository::new();
        let first = repo.get_or_create("u1").await.unwrap();
        let second = repo.get_or_create("u1").await.unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let repo = MemoryUserStateRepository::new();
        let mut state = repo.get_or_create("u1").await.unwrap();
        state.points_by_category.insert("xp".to_string(), 42);
        repo.save(state).await.unwrap();

        let loaded = repo.get("u1").await.unwrap().unwrap();
        assert_eq!(loaded.points("xp"), 42);
    }
}
