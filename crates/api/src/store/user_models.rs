//! User state models
//!
//! The per-user aggregate of accumulated gamification outcomes. Created on
//! first reward, mutated only by the reward applier, never destroyed by the
//! core.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user aggregate state.
///
/// Badge and trophy sets use `BTreeSet` so the wire representation is
/// deterministic. Wallets are connected by id only; the aggregate never
/// holds wallet objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub user_id: String,
    #[serde(default)]
    pub points_by_category: HashMap<String, i64>,
    #[serde(default)]
    pub badge_ids: BTreeSet<String>,
    #[serde(default)]
    pub trophy_ids: BTreeSet<String>,
    #[serde(default)]
    pub current_level_by_category: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserState {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            points_by_category: HashMap::new(),
            badge_ids: BTreeSet::new(),
            trophy_ids: BTreeSet::new(),
            current_level_by_category: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Current points in a category; absent categories read as zero.
    pub fn points(&self, category_id: &str) -> i64 {
        self.points_by_category
            .get(category_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badge_ids.contains(badge_id)
    }

    pub fn has_trophy(&self, trophy_id: &str) -> bool {
        self.trophy_ids.contains(trophy_id)
    }
}
