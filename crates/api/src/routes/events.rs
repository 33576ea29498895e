//! Event routes
//!
//! Ingestion, the dry-run sandbox, event listings, and the event-type
//! catalog. Ingestion only enqueues; persistence happens in the background
//! processor.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::catalog::EventTypeDescriptor;
use crate::engine::sandbox::DryRunTrace;
use crate::error::{AppError, AppResult};
use crate::shared::pagination::LimitOffsetQuery;
use crate::state::AppState;
use crate::store::event_models::{Event, NewEvent};

/// Create event routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(ingest_event))
        .route("/sandbox/dry-run", post(dry_run))
        .route("/catalog", get(event_catalog))
        .route("/user/{user_id}", get(list_by_user))
        .route("/type/{event_type}", get(list_by_type))
        .route("/{event_id}", get(get_event))
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    items: Vec<Event>,
    total: usize,
    limit: usize,
    offset: usize,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/events
/// Validate, canonicalize, and enqueue an event for asynchronous processing.
async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewEvent>,
) -> AppResult<impl IntoResponse> {
    let errors = input.validation_errors();
    if !errors.is_empty() {
        return Err(AppError::validation(errors.join("; ")));
    }

    let event = input.into_event();
    state.queue.enqueue(event.clone())?;
    tracing::info!(
        event.id = %event.id,
        event.type = %event.event_type,
        event.user_id = %event.user_id,
        "Event accepted"
    );

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/events/{}", event.id))],
        Json(event),
    ))
}

/// POST /api/events/sandbox/dry-run
/// Predict what the event would produce. No persistence, no enqueue.
async fn dry_run(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewEvent>,
) -> AppResult<Json<DryRunTrace>> {
    let trace = state.sandbox.dry_run(input).await?;
    Ok(Json(trace))
}

/// GET /api/events/catalog
/// The known event-type descriptors.
async fn event_catalog(State(state): State<Arc<AppState>>) -> Json<Vec<EventTypeDescriptor>> {
    Json(state.catalog.event_types().to_vec())
}

/// GET /api/events/user/{userId}?limit&offset
async fn list_by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitOffsetQuery>,
) -> AppResult<Json<EventListResponse>> {
    query.validate()?;
    let (items, total) = state
        .events
        .list_by_user(&user_id, query.limit, query.offset)
        .await?;
    Ok(Json(EventListResponse {
        items,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// GET /api/events/type/{eventType}?limit&offset
async fn list_by_type(
    State(state): State<Arc<AppState>>,
    Path(event_type): Path<String>,
    Query(query): Query<LimitOffsetQuery>,
) -> AppResult<Json<EventListResponse>> {
    query.validate()?;
    let (items, total) = state
        .events
        .list_by_type(&event_type, query.limit, query.offset)
        .await?;
    Ok(Json(EventListResponse {
        items,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// GET /api/events/{eventId}
async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Event>> {
    state
        .events
        .get(&event_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("event {}", event_id)))
}
