//! Leaderboard routes
//!
//! The generic query endpoint, typed convenience routes, per-user rank
//! lookups, and explicit cache refresh.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::leaderboard::{
    LeaderboardContext, LeaderboardEntry, LeaderboardPage, LeaderboardQuery, LeaderboardType,
    TimeRange,
};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Create leaderboard routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(query_leaderboard))
        .route("/points/{category}", get(points_board))
        .route("/levels/{category}", get(levels_board))
        .route("/badges", get(badges_board))
        .route("/trophies", get(trophies_board))
        .route("/user/{user_id}/rank", get(user_rank))
        .route("/refresh", post(refresh))
}

// ============================================================================
// QUERY PARSING
// ============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BoardParams {
    #[serde(rename = "type")]
    board_type: Option<String>,
    category: Option<String>,
    time_range: Option<String>,
    reference_date: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
    /// Context window size for rank lookups
    context: Option<usize>,
}

impl BoardParams {
    fn into_query(self, default_type: Option<LeaderboardType>) -> AppResult<LeaderboardQuery> {
        let board_type = match (self.board_type.as_deref(), default_type) {
            (Some(raw), _) => LeaderboardType::from_str(raw)
                .map_err(|_| AppError::validation(format!("unknown leaderboard type '{}'", raw)))?,
            (None, Some(default)) => default,
            (None, None) => return Err(AppError::validation("type is required")),
        };
        let time_range = match self.time_range.as_deref() {
            Some(raw) => TimeRange::from_str(raw)
                .map_err(|_| AppError::validation(format!("unknown timeRange '{}'", raw)))?,
            None => TimeRange::Alltime,
        };
        let reference_date = match self.reference_date.as_deref() {
            Some(raw) => parse_reference_date(raw)?,
            None => Utc::now(),
        };
        Ok(LeaderboardQuery {
            board_type,
            category: self.category.filter(|c| !c.is_empty()),
            time_range,
            reference_date,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(50),
        })
    }
}

/// Accepts RFC 3339 instants or plain dates.
fn parse_reference_date(raw: &str) -> AppResult<DateTime<Utc>> {
    if let Ok(instant) = raw.parse::<DateTime<Utc>>() {
        return Ok(instant);
    }
    if let Ok(day) = raw.parse::<NaiveDate>() {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(AppError::validation(format!(
        "referenceDate '{}' is not a date",
        raw
    )))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/leaderboards?type&category&timeRange&page&pageSize
async fn query_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoardParams>,
) -> AppResult<Json<LeaderboardPage>> {
    let query = params.into_query(None)?;
    Ok(Json(state.leaderboards.query(&query).await?))
}

/// GET /api/leaderboards/points/{category}
async fn points_board(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(mut params): Query<BoardParams>,
) -> AppResult<Json<LeaderboardPage>> {
    params.category = Some(category);
    let query = params.into_query(Some(LeaderboardType::Points))?;
    Ok(Json(state.leaderboards.query(&query).await?))
}

/// GET /api/leaderboards/levels/{category}
async fn levels_board(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(mut params): Query<BoardParams>,
) -> AppResult<Json<LeaderboardPage>> {
    params.category = Some(category);
    let query = params.into_query(Some(LeaderboardType::Level))?;
    Ok(Json(state.leaderboards.query(&query).await?))
}

/// GET /api/leaderboards/badges
async fn badges_board(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoardParams>,
) -> AppResult<Json<LeaderboardPage>> {
    let query = params.into_query(Some(LeaderboardType::Badges))?;
    Ok(Json(state.leaderboards.query(&query).await?))
}

/// GET /api/leaderboards/trophies
async fn trophies_board(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoardParams>,
) -> AppResult<Json<LeaderboardPage>> {
    let query = params.into_query(Some(LeaderboardType::Trophies))?;
    Ok(Json(state.leaderboards.query(&query).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRankResponse {
    user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<i64>,
    present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<LeaderboardContext>,
}

/// GET /api/leaderboards/user/{userId}/rank?type&category&timeRange&context
async fn user_rank(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<BoardParams>,
) -> AppResult<Json<UserRankResponse>> {
    let context_size = params.context;
    let query = params.into_query(None)?;

    let entry: Option<LeaderboardEntry> = state.leaderboards.user_rank(&user_id, &query).await?;
    let context = match (entry.as_ref(), context_size) {
        (Some(_), Some(size)) => state.leaderboards.user_context(&user_id, &query, size).await?,
        _ => None,
    };

    Ok(Json(UserRankResponse {
        user_id,
        rank: entry.as_ref().map(|e| e.rank),
        score: entry.as_ref().map(|e| e.score),
        present: entry.is_some(),
        context,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    refreshed: bool,
    scope: String,
}

/// POST /api/leaderboards/refresh
///
/// With a body, invalidates that board's cache entry; without one, clears
/// every cached board.
async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Option<Json<BoardParams>>,
) -> AppResult<Json<RefreshResponse>> {
    match body {
        Some(Json(params)) if params.board_type.is_some() => {
            let query = params.into_query(None)?;
            query.validate()?;
            state.leaderboards.refresh(&query).await;
            Ok(Json(RefreshResponse {
                refreshed: true,
                scope: "single".to_string(),
            }))
        }
        _ => {
            state.leaderboards.clear().await;
            Ok(Json(RefreshResponse {
                refreshed: true,
                scope: "all".to_string(),
            }))
        }
    }
}
