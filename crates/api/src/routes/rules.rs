//! Rule management routes
//!
//! CRUD plus activation toggles. Rule shape and the condition/reward type
//! registries are enforced at the boundary, so the engine only ever loads
//! structurally valid rules.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::engine::rules::validate_rule_config;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::rule_models::{Rule, RuleInput};

/// Create rule routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_rules).post(create_rule))
        .route("/active", get(list_active))
        .route("/trigger/{event_type}", get(list_by_trigger))
        .route(
            "/{rule_id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/{rule_id}/activate", post(activate_rule))
        .route("/{rule_id}/deactivate", post(deactivate_rule))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/rules
async fn list_rules(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.list_all().await?))
}

/// GET /api/rules/active
async fn list_active(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.list_active().await?))
}

/// GET /api/rules/trigger/{eventType}
async fn list_by_trigger(
    State(state): State<Arc<AppState>>,
    Path(event_type): Path<String>,
) -> AppResult<Json<Vec<Rule>>> {
    Ok(Json(state.rules.find_matching(&event_type).await?))
}

/// GET /api/rules/{id}
async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> AppResult<Json<Rule>> {
    state
        .rules
        .get(&rule_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("rule {}", rule_id)))
}

/// POST /api/rules
async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RuleInput>,
) -> AppResult<(StatusCode, Json<Rule>)> {
    let rule = input.into_rule()?;
    validate_rule_config(&rule)?;
    let created = state.rules.create(rule).await?;
    tracing::info!(rule.id = %created.id, "Rule created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/rules/{id}
async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
    Json(mut input): Json<RuleInput>,
) -> AppResult<Json<Rule>> {
    input.id = Some(rule_id);
    let rule = input.into_rule()?;
    validate_rule_config(&rule)?;
    let updated = state.rules.update(rule).await?;
    tracing::info!(rule.id = %updated.id, "Rule updated");
    Ok(Json(updated))
}

/// POST /api/rules/{id}/activate
async fn activate_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> AppResult<Json<Rule>> {
    Ok(Json(state.rules.set_active(&rule_id, true).await?))
}

/// POST /api/rules/{id}/deactivate
async fn deactivate_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> AppResult<Json<Rule>> {
    Ok(Json(state.rules.set_active(&rule_id, false).await?))
}

/// DELETE /api/rules/{id}
async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> AppResult<StatusCode> {
    state.rules.delete(&rule_id).await?;
    tracing::info!(rule.id = %rule_id, "Rule deleted");
    Ok(StatusCode::NO_CONTENT)
}
