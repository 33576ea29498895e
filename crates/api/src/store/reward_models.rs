//! Reward history models
//!
//! Append-only audit log of every reward attempt. Entry ids are composed
//! from `(ruleId, eventId, rewardIndex)` so a replayed instruction maps onto
//! the entry it already wrote instead of producing a second mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One reward attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardHistoryEntry {
    pub id: String,
    pub user_id: String,
    pub reward_type: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub success: bool,
    pub awarded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl RewardHistoryEntry {
    /// The idempotence key for a reward instruction.
    pub fn compose_id(rule_id: &str, event_id: &str, reward_index: usize) -> String {
        format!("{}:{}:{}", rule_id, event_id, reward_index)
    }

    /// Convenience accessor for string detail fields.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    /// Convenience accessor for integer detail fields.
    pub fn detail_i64(&self, key: &str) -> Option<i64> {
        self.details.get(key).and_then(Value::as_i64)
    }

    /// Whether the entry records a duplicate (no-op) grant.
    pub fn is_duplicate(&self) -> bool {
        self.details
            .get("duplicate")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
