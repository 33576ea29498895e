//! API routes
//!
//! All core surfaces mounted under `/api`. Auth is an external concern; the
//! core treats every caller as already authenticated.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Create API routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api_info))
        .nest("/events", super::events::router())
        .nest("/users", super::users::router())
        .nest("/rules", super::rules::router())
        .nest("/leaderboards", super::leaderboards::router())
        .nest("/wallets", super::wallets::router())
}

#[derive(Serialize)]
struct ApiInfo {
    version: String,
    modules: Vec<String>,
}

/// API info endpoint
async fn api_info() -> Json<ApiInfo> {
    Json(ApiInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        modules: vec![
            "events".to_string(),
            "users".to_string(),
            "rules".to_string(),
            "leaderboards".to_string(),
            "wallets".to_string(),
        ],
    })
}
