//! Rule models
//!
//! Rules bind event-type triggers to ordered conditions and rewards. The
//! condition and reward `type` tags stay free-form strings at this layer;
//! the engine resolves them against its registry and rejects unknown tags
//! with `InvalidRuleConfig`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// How a rule's conditions aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleLogic {
    /// Every condition must hold
    #[default]
    All,
    /// At least one condition must hold
    Any,
}

impl RuleLogic {
    /// Parse the `logic` parameter. Anything other than `all`/`any` is an
    /// invalid rule configuration.
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "all" => Ok(RuleLogic::All),
            "any" => Ok(RuleLogic::Any),
            other => Err(AppError::invalid_rule(format!(
                "unknown condition logic '{}', expected 'all' or 'any'",
                other
            ))),
        }
    }
}

/// A single condition: a type tag plus free-form parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// A declarative reward instruction template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    #[serde(rename = "type")]
    pub reward_type: String,
    #[serde(default)]
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// A configured rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub triggers: Vec<String>,
    pub conditions: Vec<Condition>,
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub logic: RuleLogic,
    /// Optional per-rule history bound; the engine passes the maximum of all
    /// matched rules (and its own default) to the history fetcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Whether this rule is eligible for an event type. Trigger matching is
    /// case-insensitive and requires the rule to be active.
    pub fn should_trigger(&self, event_type: &str) -> bool {
        self.is_active
            && self
                .triggers
                .iter()
                .any(|t| t.eq_ignore_ascii_case(event_type))
    }
}

/// Create/update input for the rule management API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    /// Raw so that unknown values surface as `InvalidRuleConfig`, not a
    /// deserialization failure
    #[serde(default)]
    pub logic: Option<String>,
    #[serde(default)]
    pub history_limit: Option<usize>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl RuleInput {
    /// Validate and build a new rule.
    pub fn into_rule(self) -> AppResult<Rule> {
        let logic = match self.logic.as_deref() {
            Some(raw) => RuleLogic::parse(raw)?,
            None => RuleLogic::default(),
        };

        let rule = Rule {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name,
            description: self.description,
            triggers: self.triggers,
            conditions: self.conditions,
            rewards: self.rewards,
            logic,
            history_limit: self.history_limit,
            is_active: self.is_active.unwrap_or(true),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rule.check_shape()?;
        Ok(rule)
    }
}

impl Rule {
    /// Structural invariants: a rule with empty triggers, conditions, or
    /// rewards is invalid.
    pub fn check_shape(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::invalid_rule("rule name must not be empty"));
        }
        if self.triggers.is_empty() || self.triggers.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::invalid_rule(
                "rule must declare at least one non-empty trigger",
            ));
        }
        if self.conditions.is_empty() {
            return Err(AppError::invalid_rule(
                "rule must declare at least one condition",
            ));
        }
        if self.rewards.is_empty() {
            return Err(AppError::invalid_rule(
                "rule must declare at least one reward",
            ));
        }
        Ok(())
    }
}
