//! Event models
//!
//! Events are the immutable input records of the pipeline: created at
//! ingestion, never mutated, purged only by the retention sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A single user-activity event.
///
/// Invariants: `id`, `event_type`, and `user_id` are non-empty. Attribute
/// payloads are free-form JSON; no schema is enforced beyond optional
/// catalog hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Event {
    /// Look up an attribute on this event.
    ///
    /// `None` means missing, which is distinct from an attribute explicitly
    /// set to JSON null.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Case-insensitive event-type comparison, matching trigger semantics.
    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type.eq_ignore_ascii_case(event_type)
    }
}

/// Ingestion input for `POST /api/events`.
///
/// `event_id` and `occurred_at` are optional; the canonical event fills them
/// with a fresh UUID and the current instant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

impl NewEvent {
    /// Validate the input, returning every violation.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.event_type.trim().is_empty() {
            errors.push("eventType is required".to_string());
        }
        if self.user_id.trim().is_empty() {
            errors.push("userId is required".to_string());
        }
        if let Some(id) = &self.event_id {
            if id.trim().is_empty() {
                errors.push("eventId must not be empty when provided".to_string());
            }
        }
        errors
    }

    /// Build the canonical event, filling defaults.
    pub fn into_event(self) -> Event {
        Event {
            id: self
                .event_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            event_type: self.event_type,
            user_id: self.user_id,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            attributes: self.attributes.unwrap_or_default(),
        }
    }
}
