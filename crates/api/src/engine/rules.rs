//! Rule engine
//!
//! Selects the active rules whose triggers match an incoming event,
//! evaluates their conditions against the user's event history, and emits
//! reward instructions for the applier. Evaluation order is deterministic:
//! rules by id lexical ascending, rewards in declared order.

use std::sync::Arc;

use crate::engine::conditions::{self, ConditionKind, ScriptHost};
use crate::engine::rewards::RewardKind;
use crate::error::AppResult;
use crate::store::event_models::Event;
use crate::store::event_repos::EventRepository;
use crate::store::rule_models::{Reward, Rule};
use crate::store::rule_repos::RuleRepository;

/// One reward to apply, tagged with its provenance. The triple
/// `(rule_id, event_id, reward_index)` is the applier's idempotence key.
#[derive(Debug, Clone)]
pub struct RewardInstruction {
    pub rule_id: String,
    pub rule_name: String,
    pub event_id: String,
    pub user_id: String,
    pub reward_index: usize,
    pub reward: Reward,
}

/// Reject rules whose condition or reward tags fall outside the registries.
pub fn validate_rule_config(rule: &Rule) -> AppResult<()> {
    rule.check_shape()?;
    for condition in &rule.conditions {
        ConditionKind::parse(&condition.condition_type)?;
    }
    for reward in &rule.rewards {
        RewardKind::parse(&reward.reward_type)?;
    }
    Ok(())
}

/// The trigger-match → condition-evaluation → instruction pipeline.
pub struct RuleEngine {
    rules: Arc<dyn RuleRepository>,
    events: Arc<dyn EventRepository>,
    history_limit: usize,
    script_host: Option<Arc<dyn ScriptHost>>,
}

impl RuleEngine {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        events: Arc<dyn EventRepository>,
        history_limit: usize,
        script_host: Option<Arc<dyn ScriptHost>>,
    ) -> Self {
        Self {
            rules,
            events,
            history_limit,
            script_host,
        }
    }

    pub fn script_host(&self) -> Option<&dyn ScriptHost> {
        self.script_host.as_deref()
    }

    /// The history bound for a set of matched rules: the engine default, or
    /// the largest per-rule declaration when a rule asks for more.
    pub fn history_bound(&self, rules: &[Rule]) -> usize {
        rules
            .iter()
            .filter_map(|r| r.history_limit)
            .fold(self.history_limit, usize::max)
    }

    /// The user's prior events in chronological order, bounded, with the
    /// trigger event itself excluded. The processor stores the event before
    /// evaluating, so the exclusion keeps "history" meaning strictly prior
    /// activity.
    pub async fn history_for(&self, event: &Event, bound: usize) -> AppResult<Vec<Event>> {
        let mut history = self.events.recent_for_user(&event.user_id, bound + 1).await?;
        history.retain(|e| e.id != event.id);
        if history.len() > bound {
            history.drain(..history.len() - bound);
        }
        Ok(history)
    }

    /// Evaluate an event against all matching rules.
    ///
    /// Rules with invalid configuration are logged and skipped; the engine
    /// continues with the rest.
    pub async fn evaluate(&self, event: &Event) -> AppResult<Vec<RewardInstruction>> {
        let matched = self.rules.find_matching(&event.event_type).await?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let bound = self.history_bound(&matched);
        let history = self.history_for(event, bound).await?;

        let mut instructions = Vec::new();
        for rule in &matched {
            if let Err(err) = validate_rule_config(rule) {
                tracing::warn!(
                    rule.id = %rule.id,
                    error.message = %err,
                    "Skipping rule with invalid configuration"
                );
                continue;
            }

            let passed = conditions::evaluate_conditions(
                &rule.conditions,
                &history,
                event,
                rule.logic,
                self.script_host(),
            );
            if !passed {
                continue;
            }

            tracing::debug!(
                rule.id = %rule.id,
                event.id = %event.id,
                rewards = rule.rewards.len(),
                "Rule matched"
            );
            for (reward_index, reward) in rule.rewards.iter().enumerate() {
                instructions.push(RewardInstruction {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    event_id: event.id.clone(),
                    user_id: event.user_id.clone(),
                    reward_index,
                    reward: reward.clone(),
                });
            }
        }
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::event_models::NewEvent;
    use crate::store::event_repos::MemoryEventRepository;
    use crate::store::rule_models::{Condition, RuleInput};
    use crate::store::rule_repos::MemoryRuleRepository;
    use serde_json::{json, Map};

    fn new_event(event_type: &str, user_id: &str) -> Event {
        NewEvent {
            event_id: None,
            event_type: event_type.to_string(),
            user_id: user_id.to_string(),
            occurred_at: None,
            attributes: None,
        }
        .into_event()
    }

    fn condition(condition_type: &str, params: serde_json::Value) -> Condition {
        Condition {
            id: None,
            condition_type: condition_type.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    fn reward(reward_type: &str, target_id: &str, amount: Option<i64>) -> Reward {
        Reward {
            reward_type: reward_type.to_string(),
            target_id: target_id.to_string(),
            amount,
            params: Map::new(),
        }
    }

    fn rule(id: &str, trigger: &str, conditions: Vec<Condition>, rewards: Vec<Reward>) -> Rule {
        RuleInput {
            id: Some(id.to_string()),
            name: format!("rule {}", id),
            description: String::new(),
            triggers: vec![trigger.to_string()],
            conditions,
            rewards,
            logic: None,
            history_limit: None,
            is_active: Some(true),
        }
        .into_rule()
        .unwrap()
    }

    async fn engine() -> (RuleEngine, Arc<MemoryRuleRepository>, Arc<MemoryEventRepository>) {
        let rules = MemoryRuleRepository::new();
        let events = MemoryEventRepository::new();
        let engine = RuleEngine::new(rules.clone(), events.clone(), 1000, None);
        (engine, rules, events)
    }

    #[tokio::test]
    async fn test_evaluate_emits_rewards_in_declared_order() {
        let (engine, rules, _) = engine().await;
        rules
            .create(rule(
                "r1",
                "USER_COMMENTED",
                vec![condition("alwaysTrue", json!({}))],
                vec![
                    reward("badge", "first-comment", None),
                    reward("points", "xp", Some(10)),
                ],
            ))
            .await
            .unwrap();

        let event = new_event("USER_COMMENTED", "u1");
        let instructions = engine.evaluate(&event).await.unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].reward_index, 0);
        assert_eq!(instructions[0].reward.reward_type, "badge");
        assert_eq!(instructions[1].reward_index, 1);
        assert_eq!(instructions[1].reward.reward_type, "points");
    }

    #[tokio::test]
    async fn test_rules_processed_in_id_order() {
        let (engine, rules, _) = engine().await;
        for id in ["rB", "rA"] {
            rules
                .create(rule(
                    id,
                    "PING",
                    vec![condition("alwaysTrue", json!({}))],
                    vec![reward("points", "xp", Some(1))],
                ))
                .await
                .unwrap();
        }

        let instructions = engine.evaluate(&new_event("PING", "u1")).await.unwrap();
        let order: Vec<_> = instructions.iter().map(|i| i.rule_id.as_str()).collect();
        assert_eq!(order, vec!["rA", "rB"]);
    }

    #[tokio::test]
    async fn test_invalid_rule_skipped_engine_continues() {
        let (engine, rules, _) = engine().await;
        rules
            .create(rule(
                "r1",
                "PING",
                vec![condition("mystery", json!({}))],
                vec![reward("points", "xp", Some(1))],
            ))
            .await
            .unwrap();
        rules
            .create(rule(
                "r2",
                "PING",
                vec![condition("alwaysTrue", json!({}))],
                vec![reward("points", "xp", Some(5))],
            ))
            .await
            .unwrap();

        let instructions = engine.evaluate(&new_event("PING", "u1")).await.unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].rule_id, "r2");
    }

    #[tokio::test]
    async fn test_history_excludes_trigger_event() {
        let (engine, rules, events) = engine().await;
        rules
            .create(rule(
                "r1",
                "USER_COMMENTED",
                vec![condition("firstOccurrence", json!({"maxOccurrences": 1}))],
                vec![reward("badge", "first-comment", None)],
            ))
            .await
            .unwrap();

        // The processor stores the event before evaluation; the engine must
        // still see an empty prior history for the first occurrence.
        let event = new_event("USER_COMMENTED", "u1");
        events.store(&event).await.unwrap();
        let instructions = engine.evaluate(&event).await.unwrap();
        assert_eq!(instructions.len(), 1);

        let second = new_event("USER_COMMENTED", "u1");
        events.store(&second).await.unwrap();
        let instructions = engine.evaluate(&second).await.unwrap();
        assert!(instructions.is_empty());
    }

    #[tokio::test]
    async fn test_no_matching_rules_is_empty() {
        let (engine, _, _) = engine().await;
        assert!(engine
            .evaluate(&new_event("UNMATCHED", "u1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_history_bound_respects_rule_declarations() {
        let (engine, _, _) = engine().await;
        let mut r = rule(
            "r1",
            "PING",
            vec![condition("alwaysTrue", json!({}))],
            vec![reward("points", "xp", Some(1))],
        );
        r.history_limit = Some(5000);
        assert_eq!(engine.history_bound(&[r]), 5000);
    }
}
