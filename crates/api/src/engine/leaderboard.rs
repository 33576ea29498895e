//! Leaderboard engine
//!
//! Projects user state (alltime) or time-windowed reward history into
//! ranked, paginated result sets. Generated boards are cached per
//! `type:category:timeRange:referenceDay` with a TTL; `refresh` invalidates
//! one key and `clear` drops everything. Pagination happens after the cache
//! read, so every page of one board shares a generation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::store::reward_models::RewardHistoryEntry;
use crate::store::reward_repos::RewardHistoryRepository;
use crate::store::user_repos::UserStateRepository;

/// What is being ranked.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaderboardType {
    Points,
    Badges,
    Trophies,
    Level,
}

/// The aggregation window.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimeRange {
    Daily,
    Weekly,
    Monthly,
    Alltime,
}

/// A validated leaderboard query.
#[derive(Debug, Clone)]
pub struct LeaderboardQuery {
    pub board_type: LeaderboardType,
    pub category: Option<String>,
    pub time_range: TimeRange,
    pub reference_date: DateTime<Utc>,
    pub page: usize,
    pub page_size: usize,
}

impl LeaderboardQuery {
    /// Enforce the query invariants: `points`/`level` require a category,
    /// `badges`/`trophies` forbid one, and pagination stays in range.
    pub fn validate(&self) -> AppResult<()> {
        match self.board_type {
            LeaderboardType::Points | LeaderboardType::Level => {
                if self.category.as_deref().unwrap_or("").is_empty() {
                    return Err(AppError::validation(format!(
                        "{} leaderboards require a category",
                        self.board_type
                    )));
                }
            }
            LeaderboardType::Badges | LeaderboardType::Trophies => {
                if self.category.is_some() {
                    return Err(AppError::validation(format!(
                        "{} leaderboards do not take a category",
                        self.board_type
                    )));
                }
            }
        }
        if self.page < 1 {
            return Err(AppError::validation("page must be at least 1"));
        }
        if self.page_size < 1 || self.page_size > 1000 {
            return Err(AppError::validation("pageSize must be between 1 and 1000"));
        }
        Ok(())
    }

    /// Cache key at day precision.
    fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.board_type,
            self.category.as_deref().unwrap_or("-"),
            self.time_range,
            self.reference_date.date_naive()
        )
    }

    /// The UTC `[start, end)` window, or `None` for alltime. Weeks start on
    /// Monday.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let day: NaiveDate = self.reference_date.date_naive();
        let (start, end) = match self.time_range {
            TimeRange::Alltime => return None,
            TimeRange::Daily => (day, day.checked_add_days(Days::new(1))?),
            TimeRange::Weekly => {
                let monday =
                    day.checked_sub_days(Days::new(day.weekday().num_days_from_monday() as u64))?;
                (monday, monday.checked_add_days(Days::new(7))?)
            }
            TimeRange::Monthly => {
                let first = day.with_day(1)?;
                (first, first.checked_add_months(Months::new(1))?)
            }
        };
        Some((
            start.and_hms_opt(0, 0, 0)?.and_utc(),
            end.and_hms_opt(0, 0, 0)?.and_utc(),
        ))
    }
}

/// One ranked row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub score: i64,
    pub rank: usize,
}

/// One page of a board.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_entry: Option<LeaderboardEntry>,
    pub generated_at: DateTime<Utc>,
}

/// Context window centered on one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardContext {
    pub user_id: String,
    pub rank: usize,
    pub entries: Vec<LeaderboardEntry>,
    pub total_count: usize,
}

struct CacheSlot {
    entries: Arc<Vec<LeaderboardEntry>>,
    generated_at: DateTime<Utc>,
    stored_at: Instant,
}

/// Ranked projections with a TTL-bounded cache.
pub struct LeaderboardEngine {
    users: Arc<dyn UserStateRepository>,
    history: Arc<dyn RewardHistoryRepository>,
    cache: RwLock<HashMap<String, CacheSlot>>,
    ttl: Duration,
}

impl LeaderboardEngine {
    pub fn new(
        users: Arc<dyn UserStateRepository>,
        history: Arc<dyn RewardHistoryRepository>,
        ttl: Duration,
    ) -> Self {
        Self {
            users,
            history,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Run a query and return the requested page.
    pub async fn query(&self, query: &LeaderboardQuery) -> AppResult<LeaderboardPage> {
        query.validate()?;
        let (entries, generated_at) = self.ranked(query).await?;

        let offset = (query.page - 1) * query.page_size;
        let page_entries = entries
            .iter()
            .skip(offset)
            .take(query.page_size)
            .cloned()
            .collect();

        Ok(LeaderboardPage {
            entries: page_entries,
            total_count: entries.len(),
            page: query.page,
            page_size: query.page_size,
            top_entry: entries.first().cloned(),
            generated_at,
        })
    }

    /// The user's ranked row, or `None` when they are not on the board.
    pub async fn user_rank(
        &self,
        user_id: &str,
        query: &LeaderboardQuery,
    ) -> AppResult<Option<LeaderboardEntry>> {
        query.validate()?;
        let (entries, _) = self.ranked(query).await?;
        Ok(entries.iter().find(|e| e.user_id == user_id).cloned())
    }

    /// `context_size` entries centered on the user: `floor(size/2)` above,
    /// the remainder below, clamped to the board.
    pub async fn user_context(
        &self,
        user_id: &str,
        query: &LeaderboardQuery,
        context_size: usize,
    ) -> AppResult<Option<LeaderboardContext>> {
        query.validate()?;
        if context_size == 0 {
            return Err(AppError::validation("contextSize must be at least 1"));
        }
        let (entries, _) = self.ranked(query).await?;
        let Some(position) = entries.iter().position(|e| e.user_id == user_id) else {
            return Ok(None);
        };

        let above = context_size / 2;
        let end = (position.saturating_sub(above) + context_size).min(entries.len());
        let start = end.saturating_sub(context_size);

        Ok(Some(LeaderboardContext {
            user_id: user_id.to_string(),
            rank: entries[position].rank,
            entries: entries[start..end].to_vec(),
            total_count: entries.len(),
        }))
    }

    /// Invalidate one cached board; the next read regenerates.
    pub async fn refresh(&self, query: &LeaderboardQuery) {
        self.cache.write().await.remove(&query.cache_key());
    }

    /// Drop every cached board.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    async fn ranked(
        &self,
        query: &LeaderboardQuery,
    ) -> AppResult<(Arc<Vec<LeaderboardEntry>>, DateTime<Utc>)> {
        let key = query.cache_key();
        {
            let cache = self.cache.read().await;
            if let Some(slot) = cache.get(&key) {
                if slot.stored_at.elapsed() < self.ttl {
                    return Ok((slot.entries.clone(), slot.generated_at));
                }
            }
        }

        let entries = Arc::new(self.generate(query).await?);
        let generated_at = Utc::now();
        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CacheSlot {
                entries: entries.clone(),
                generated_at,
                stored_at: Instant::now(),
            },
        );
        Ok((entries, generated_at))
    }

    async fn generate(&self, query: &LeaderboardQuery) -> AppResult<Vec<LeaderboardEntry>> {
        let scores = match query.window() {
            None => self.project_user_states(query).await?,
            Some((start, end)) => self.aggregate_history(query, start, end).await?,
        };

        let mut rows: Vec<(String, i64)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0)
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        // Competition ranking: ties share a rank, the next distinct score
        // resumes at its positional rank.
        let mut entries = Vec::with_capacity(rows.len());
        let mut rank = 0;
        let mut previous_score = None;
        for (index, (user_id, score)) in rows.into_iter().enumerate() {
            if previous_score != Some(score) {
                rank = index + 1;
                previous_score = Some(score);
            }
            entries.push(LeaderboardEntry {
                user_id,
                score,
                rank,
            });
        }
        Ok(entries)
    }

    async fn project_user_states(
        &self,
        query: &LeaderboardQuery,
    ) -> AppResult<HashMap<String, i64>> {
        let states = self.users.list_all().await?;
        let category = query.category.as_deref().unwrap_or("");
        Ok(states
            .into_iter()
            .map(|state| {
                let score = match query.board_type {
                    LeaderboardType::Points | LeaderboardType::Level => state.points(category),
                    LeaderboardType::Badges => state.badge_ids.len() as i64,
                    LeaderboardType::Trophies => state.trophy_ids.len() as i64,
                };
                (state.user_id, score)
            })
            .collect())
    }

    async fn aggregate_history(
        &self,
        query: &LeaderboardQuery,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<HashMap<String, i64>> {
        let entries = self.history.list_in_range(start, end).await?;
        let mut scores: HashMap<String, i64> = HashMap::new();
        for entry in entries.iter().filter(|e| e.success) {
            if let Some(score) = self.contribution(query, entry) {
                *scores.entry(entry.user_id.clone()).or_default() += score;
            }
        }
        Ok(scores)
    }

    /// A history entry's contribution to the queried board: signed point
    /// amounts (penalties reduce) or distinct grant counts.
    fn contribution(&self, query: &LeaderboardQuery, entry: &RewardHistoryEntry) -> Option<i64> {
        match query.board_type {
            LeaderboardType::Points | LeaderboardType::Level => {
                if entry.reward_type != "points" && entry.reward_type != "penalty" {
                    return None;
                }
                if entry.detail_str("category") != query.category.as_deref() {
                    return None;
                }
                entry.detail_i64("amount")
            }
            LeaderboardType::Badges => {
                (entry.reward_type == "badge" && !entry.is_duplicate()).then_some(1)
            }
            LeaderboardType::Trophies => {
                (entry.reward_type == "trophy" && !entry.is_duplicate()).then_some(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::reward_repos::MemoryRewardHistoryRepository;
    use crate::store::user_models::UserState;
    use crate::store::user_repos::MemoryUserStateRepository;
    use serde_json::json;

    fn query(board_type: LeaderboardType, category: Option<&str>, range: TimeRange) -> LeaderboardQuery {
        LeaderboardQuery {
            board_type,
            category: category.map(str::to_string),
            time_range: range,
            reference_date: Utc::now(),
            page: 1,
            page_size: 50,
        }
    }

    async fn engine_with_points(
        points: &[(&str, i64)],
    ) -> (LeaderboardEngine, Arc<MemoryUserStateRepository>) {
        let users = MemoryUserStateRepository::new();
        let history = MemoryRewardHistoryRepository::new();
        for (user_id, score) in points {
            let mut state = UserState::new(*user_id);
            state.points_by_category.insert("xp".to_string(), *score);
            users.save(state).await.unwrap();
        }
        (
            LeaderboardEngine::new(users.clone(), history, Duration::from_secs(300)),
            users,
        )
    }

    #[tokio::test]
    async fn test_alltime_points_ranking() {
        let (engine, _) = engine_with_points(&[("u1", 1500), ("u2", 1200), ("u3", 800)]).await;
        let page = engine
            .query(&query(LeaderboardType::Points, Some("xp"), TimeRange::Alltime))
            .await
            .unwrap();

        assert_eq!(page.total_count, 3);
        assert_eq!(page.entries[0], LeaderboardEntry { user_id: "u1".into(), score: 1500, rank: 1 });
        assert_eq!(page.entries[1].rank, 2);
        assert_eq!(page.entries[2].rank, 3);
        assert_eq!(page.top_entry.as_ref().unwrap().user_id, "u1");
    }

    #[tokio::test]
    async fn test_ties_share_rank_and_skip() {
        let (engine, _) =
            engine_with_points(&[("a", 100), ("b", 100), ("c", 50), ("d", 100)]).await;
        let page = engine
            .query(&query(LeaderboardType::Points, Some("xp"), TimeRange::Alltime))
            .await
            .unwrap();

        let ranks: Vec<(String, usize)> = page
            .entries
            .iter()
            .map(|e| (e.user_id.clone(), e.rank))
            .collect();
        // Tied users ordered by id, next distinct score lands at rank 4
        assert_eq!(
            ranks,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("d".to_string(), 1),
                ("c".to_string(), 4),
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_scores_omitted() {
        let (engine, _) = engine_with_points(&[("u1", 10), ("u2", 0), ("u3", -5)]).await;
        let page = engine
            .query(&query(LeaderboardType::Points, Some("xp"), TimeRange::Alltime))
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.entries[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_validation_rules() {
        let (engine, _) = engine_with_points(&[]).await;
        assert!(engine
            .query(&query(LeaderboardType::Points, None, TimeRange::Alltime))
            .await
            .is_err());
        assert!(engine
            .query(&query(LeaderboardType::Badges, Some("xp"), TimeRange::Alltime))
            .await
            .is_err());

        let mut bad_page = query(LeaderboardType::Points, Some("xp"), TimeRange::Alltime);
        bad_page.page_size = 5000;
        assert!(engine.query(&bad_page).await.is_err());
    }

    #[tokio::test]
    async fn test_pagination_after_cache() {
        let (engine, _) =
            engine_with_points(&[("a", 4), ("b", 3), ("c", 2), ("d", 1)]).await;
        let mut q = query(LeaderboardType::Points, Some("xp"), TimeRange::Alltime);
        q.page_size = 2;
        q.page = 2;

        let page = engine.query(&q).await.unwrap();
        assert_eq!(page.total_count, 4);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].user_id, "c");
        assert_eq!(page.entries[0].rank, 3);
        // top entry reflects the whole board, not the page
        assert_eq!(page.top_entry.unwrap().user_id, "a");
    }

    #[tokio::test]
    async fn test_cache_serves_stale_until_refresh() {
        let (engine, users) = engine_with_points(&[("u1", 10)]).await;
        let q = query(LeaderboardType::Points, Some("xp"), TimeRange::Alltime);

        assert_eq!(engine.query(&q).await.unwrap().total_count, 1);

        let mut state = UserState::new("u2");
        state.points_by_category.insert("xp".to_string(), 99);
        users.save(state).await.unwrap();

        // Cached generation still visible
        assert_eq!(engine.query(&q).await.unwrap().total_count, 1);

        engine.refresh(&q).await;
        assert_eq!(engine.query(&q).await.unwrap().total_count, 2);
    }

    #[tokio::test]
    async fn test_windowed_points_from_history() {
        let users = MemoryUserStateRepository::new();
        let history = MemoryRewardHistoryRepository::new();
        let engine = LeaderboardEngine::new(users, history.clone(), Duration::from_secs(300));

        use crate::store::reward_repos::RewardHistoryRepository;
        let record = |id: &str, user: &str, rtype: &str, amount: i64, success: bool| {
            RewardHistoryEntry {
                id: id.to_string(),
                user_id: user.to_string(),
                reward_type: rtype.to_string(),
                details: json!({"category": "xp", "amount": amount})
                    .as_object()
                    .cloned()
                    .unwrap(),
                success,
                awarded_at: Utc::now(),
                failure_reason: None,
            }
        };
        history.record(record("1", "u1", "points", 100, true)).await.unwrap();
        history.record(record("2", "u1", "penalty", -30, true)).await.unwrap();
        history.record(record("3", "u2", "points", 50, true)).await.unwrap();
        history.record(record("4", "u2", "points", 500, false)).await.unwrap();

        let page = engine
            .query(&query(LeaderboardType::Points, Some("xp"), TimeRange::Daily))
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].user_id, "u1");
        assert_eq!(page.entries[0].score, 70);
        assert_eq!(page.entries[1].score, 50);
    }

    #[tokio::test]
    async fn test_user_rank_and_context() {
        let (engine, _) = engine_with_points(&[
            ("a", 50),
            ("b", 40),
            ("c", 30),
            ("d", 20),
            ("e", 10),
        ])
        .await;
        let q = query(LeaderboardType::Points, Some("xp"), TimeRange::Alltime);

        let rank = engine.user_rank("c", &q).await.unwrap().unwrap();
        assert_eq!(rank.rank, 3);
        assert!(engine.user_rank("ghost", &q).await.unwrap().is_none());

        let context = engine.user_context("c", &q, 3).await.unwrap().unwrap();
        let ids: Vec<_> = context.entries.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert_eq!(context.rank, 3);

        // Clamped at the top of the board
        let context = engine.user_context("a", &q, 3).await.unwrap().unwrap();
        let ids: Vec<_> = context.entries.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_week_window_starts_monday() {
        let q = LeaderboardQuery {
            board_type: LeaderboardType::Points,
            category: Some("xp".to_string()),
            time_range: TimeRange::Weekly,
            // 2026-07-29 is a Wednesday
            reference_date: "2026-07-29T15:30:00Z".parse().unwrap(),
            page: 1,
            page_size: 50,
        };
        let (start, end) = q.window().unwrap();
        assert_eq!(start.to_rfc3339(), "2026-07-27T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-08-03T00:00:00+00:00");
    }

    #[test]
    fn test_month_window() {
        let q = LeaderboardQuery {
            board_type: LeaderboardType::Points,
            category: Some("xp".to_string()),
            time_range: TimeRange::Monthly,
            reference_date: "2026-02-15T09:00:00Z".parse().unwrap(),
            page: 1,
            page_size: 50,
        };
        let (start, end) = q.window().unwrap();
        assert_eq!(start.to_rfc3339(), "2026-02-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-03-01T00:00:00+00:00");
    }
}
