//! Test helpers
//!
//! Builders for application state, a test HTTP server over the real router,
//! and rule/event fixtures shared across the scenario suites.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::json;

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::state::AppState;
use crate::store::rule_models::{Condition, Reward, Rule, RuleInput};

/// Config with a small queue and fast shutdown, suitable for tests.
pub fn test_config(queue_capacity: usize, workers: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.queue.capacity = queue_capacity;
    config.queue.workers = workers;
    config.queue.stop_grace_seconds = 1;
    config
}

pub fn test_state(queue_capacity: usize, workers: usize) -> Arc<AppState> {
    Arc::new(AppState::new(&test_config(queue_capacity, workers)))
}

pub fn test_state_with_catalog(catalog: Catalog) -> Arc<AppState> {
    Arc::new(AppState::with_catalog(&test_config(100, 1), catalog))
}

/// Test server over the production router.
pub fn server(state: &Arc<AppState>) -> TestServer {
    TestServer::new(crate::build_router(state.clone())).expect("router must build")
}

/// Ingestion body for `POST /api/events`.
pub fn event_body(event_type: &str, user_id: &str) -> serde_json::Value {
    json!({"eventType": event_type, "userId": user_id})
}

/// The first-comment rule: badge plus ten points on a user's first comment.
pub fn first_comment_rule() -> Rule {
    RuleInput {
        id: Some("R1".to_string()),
        name: "First comment".to_string(),
        description: "Badge and points for the first comment".to_string(),
        triggers: vec!["USER_COMMENTED".to_string()],
        conditions: vec![Condition {
            id: None,
            condition_type: "firstOccurrence".to_string(),
            params: json!({"maxOccurrences": 1}).as_object().cloned().unwrap(),
        }],
        rewards: vec![
            Reward {
                reward_type: "badge".to_string(),
                target_id: "first-comment".to_string(),
                amount: None,
                params: Default::default(),
            },
            Reward {
                reward_type: "points".to_string(),
                target_id: "xp".to_string(),
                amount: Some(10),
                params: Default::default(),
            },
        ],
        logic: None,
        history_limit: None,
        is_active: Some(true),
    }
    .into_rule()
    .expect("fixture rule is valid")
}

/// Simple always-firing points rule.
pub fn points_rule(id: &str, trigger: &str, amount: i64) -> Rule {
    RuleInput {
        id: Some(id.to_string()),
        name: format!("points rule {}", id),
        description: String::new(),
        triggers: vec![trigger.to_string()],
        conditions: vec![Condition {
            id: None,
            condition_type: "alwaysTrue".to_string(),
            params: Default::default(),
        }],
        rewards: vec![Reward {
            reward_type: "points".to_string(),
            target_id: "xp".to_string(),
            amount: Some(amount),
            params: Default::default(),
        }],
        logic: None,
        history_limit: None,
        is_active: Some(true),
    }
    .into_rule()
    .expect("fixture rule is valid")
}

/// Poll until the processor has handled `count` events.
pub async fn wait_for_processed(state: &AppState, count: u64) {
    for _ in 0..200 {
        if state.processor.processed_event_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "processor stuck at {} of {} events",
        state.processor.processed_event_count(),
        count
    );
}
