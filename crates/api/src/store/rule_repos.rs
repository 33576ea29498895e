//! Rule repository
//!
//! Port plus in-memory backing for rule configuration. Listings come back in
//! rule-id lexical order so engine evaluation stays deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::rule_models::Rule;
use crate::error::{AppError, AppResult};

/// Port for rule configuration.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_all(&self) -> AppResult<Vec<Rule>>;

    async fn list_active(&self) -> AppResult<Vec<Rule>>;

    /// Active rules whose triggers match the event type (case-insensitive).
    async fn find_matching(&self, event_type: &str) -> AppResult<Vec<Rule>>;

    async fn get(&self, id: &str) -> AppResult<Option<Rule>>;

    async fn create(&self, rule: Rule) -> AppResult<Rule>;

    /// Replace an existing rule, bumping `updated_at`.
    async fn update(&self, rule: Rule) -> AppResult<Rule>;

    /// Flip the active flag. Returns the updated rule.
    async fn set_active(&self, id: &str, active: bool) -> AppResult<Rule>;

    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// In-memory rule store.
#[derive(Default)]
pub struct MemoryRuleRepository {
    rules: RwLock<HashMap<String, Rule>>,
}

impl MemoryRuleRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn sorted(mut rules: Vec<Rule>) -> Vec<Rule> {
    rules.sort_by(|a, b| a.id.cmp(&b.id));
    rules
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn list_all(&self) -> AppResult<Vec<Rule>> {
        let rules = self.rules.read().await;
        Ok(sorted(rules.values().cloned().collect()))
    }

    async fn list_active(&self) -> AppResult<Vec<Rule>> {
        let rules = self.rules.read().await;
        Ok(sorted(
            rules.values().filter(|r| r.is_active).cloned().collect(),
        ))
    }

    async fn find_matching(&self, event_type: &str) -> AppResult<Vec<Rule>> {
        let rules = self.rules.read().await;
        Ok(sorted(
            rules
                .values()
                .filter(|r| r.should_trigger(event_type))
                .cloned()
                .collect(),
        ))
    }

    async fn get(&self, id: &str) -> AppResult<Option<Rule>> {
        let rules = self.rules.read().await;
        Ok(rules.get(id).cloned())
    }

    async fn create(&self, rule: Rule) -> AppResult<Rule> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) {
            return Err(AppError::validation(format!(
                "rule {} already exists",
                rule.id
            )));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn update(&self, mut rule: Rule) -> AppResult<Rule> {
        let mut rules = self.rules.write().await;
        let existing = rules
            .get(&rule.id)
            .ok_or_else(|| AppError::not_found(format!("rule {}", rule.id)))?;
        rule.created_at = existing.created_at;
        rule.updated_at = Utc::now();
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn set_active(&self, id: &str, active: bool) -> AppResult<Rule> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("rule {}", id)))?;
        rule.is_active = active;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let mut rules = self.rules.write().await;
        rules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(format!("rule {}", id)))
    }
}
