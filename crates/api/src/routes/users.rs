//! User routes
//!
//! Read-only views over per-user gamification state: points, badges,
//! trophies, levels, and the reward history.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::shared::pagination::{Paginated, PaginationQuery};
use crate::state::AppState;
use crate::store::reward_models::RewardHistoryEntry;
use crate::store::user_models::UserState;

/// Create user routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{user_id}/state", get(get_state))
        .route("/{user_id}/points", get(get_points))
        .route("/{user_id}/points/{category}", get(get_points_category))
        .route("/{user_id}/badges", get(get_badges))
        .route("/{user_id}/trophies", get(get_trophies))
        .route("/{user_id}/levels", get(get_levels))
        .route("/{user_id}/levels/{category}", get(get_level_category))
        .route("/{user_id}/rewards/history", get(get_reward_history))
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryPoints {
    category: String,
    points: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AwardedItem {
    id: String,
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    visible: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryLevel {
    category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    level_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level_name: Option<String>,
    points: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    page: Option<usize>,
    page_size: Option<usize>,
    /// Optional reward-type filter
    #[serde(rename = "type")]
    reward_type: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Load the stored aggregate, or an empty one for users the applier has not
/// touched yet. Reads never create state.
async fn load_state(state: &AppState, user_id: &str) -> AppResult<UserState> {
    Ok(state
        .users
        .get(user_id)
        .await?
        .unwrap_or_else(|| UserState::new(user_id)))
}

/// GET /api/users/{userId}/state
async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserState>> {
    Ok(Json(load_state(&state, &user_id).await?))
}

/// GET /api/users/{userId}/points
async fn get_points(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<CategoryPoints>>> {
    let user = load_state(&state, &user_id).await?;
    let mut points: Vec<CategoryPoints> = user
        .points_by_category
        .into_iter()
        .map(|(category, points)| CategoryPoints { category, points })
        .collect();
    points.sort_by(|a, b| a.category.cmp(&b.category));
    Ok(Json(points))
}

/// GET /api/users/{userId}/points/{category}
async fn get_points_category(
    State(state): State<Arc<AppState>>,
    Path((user_id, category)): Path<(String, String)>,
) -> AppResult<Json<CategoryPoints>> {
    let user = load_state(&state, &user_id).await?;
    Ok(Json(CategoryPoints {
        points: user.points(&category),
        category,
    }))
}

/// GET /api/users/{userId}/badges
async fn get_badges(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<AwardedItem>>> {
    let user = load_state(&state, &user_id).await?;
    let badges = user
        .badge_ids
        .iter()
        .map(|id| match state.catalog.badge(id) {
            Some(badge) => AwardedItem {
                id: badge.id.clone(),
                name: badge.name.clone(),
                description: badge.description.clone(),
                image: badge.image.clone(),
                visible: badge.visible,
            },
            None => AwardedItem {
                id: id.clone(),
                name: id.clone(),
                description: String::new(),
                image: None,
                visible: true,
            },
        })
        .collect();
    Ok(Json(badges))
}

/// GET /api/users/{userId}/trophies
async fn get_trophies(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<AwardedItem>>> {
    let user = load_state(&state, &user_id).await?;
    let trophies = user
        .trophy_ids
        .iter()
        .map(|id| match state.catalog.trophy(id) {
            Some(trophy) => AwardedItem {
                id: trophy.id.clone(),
                name: trophy.name.clone(),
                description: trophy.description.clone(),
                image: trophy.image.clone(),
                visible: trophy.visible,
            },
            None => AwardedItem {
                id: id.clone(),
                name: id.clone(),
                description: String::new(),
                image: None,
                visible: true,
            },
        })
        .collect();
    Ok(Json(trophies))
}

/// GET /api/users/{userId}/levels
async fn get_levels(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<CategoryLevel>>> {
    let user = load_state(&state, &user_id).await?;
    let mut levels: Vec<CategoryLevel> = state
        .catalog
        .categories()
        .map(|category| level_view(&state, &user, &category.id))
        .collect();
    levels.sort_by(|a, b| a.category.cmp(&b.category));
    Ok(Json(levels))
}

/// GET /api/users/{userId}/levels/{category}
async fn get_level_category(
    State(state): State<Arc<AppState>>,
    Path((user_id, category)): Path<(String, String)>,
) -> AppResult<Json<CategoryLevel>> {
    let user = load_state(&state, &user_id).await?;
    Ok(Json(level_view(&state, &user, &category)))
}

fn level_view(state: &AppState, user: &UserState, category: &str) -> CategoryLevel {
    let points = user.points(category);
    let level = state.catalog.level_for_points(category, points);
    CategoryLevel {
        category: category.to_string(),
        level_id: level.map(|l| l.id.clone()),
        level_name: level.map(|l| l.name.clone()),
        points,
    }
}

/// GET /api/users/{userId}/rewards/history?page&pageSize&type&from&to
async fn get_reward_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Paginated<RewardHistoryEntry>>> {
    let pagination = PaginationQuery {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(20),
    }
    .normalize()?;
    let range = match (query.from, query.to) {
        (Some(from), Some(to)) => Some((from, to)),
        (Some(from), None) => Some((from, Utc::now())),
        (None, Some(to)) => Some((DateTime::<Utc>::MIN_UTC, to)),
        (None, None) => None,
    };
    let (entries, total) = state
        .rewards
        .list_by_user(
            &user_id,
            query.reward_type.as_deref(),
            range,
            pagination.page_size,
            pagination.offset,
        )
        .await?;
    Ok(Json(Paginated::new(entries, total, &pagination)))
}
