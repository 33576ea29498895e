//! Dry-run sandbox
//!
//! Evaluates a candidate event against the rule set without storing the
//! event, applying rewards, or touching any state. Produces a structured
//! trace: per-rule trigger matching, per-condition outcomes with timings,
//! and the rewards that would be granted.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::Catalog;
use crate::engine::conditions::{self, ScriptHost};
use crate::engine::rules::{validate_rule_config, RuleEngine};
use crate::error::AppResult;
use crate::store::event_models::{Event, NewEvent};
use crate::store::rule_models::{Rule, RuleLogic};
use crate::store::rule_repos::RuleRepository;

/// Trace of one condition evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTrace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_id: Option<String>,
    #[serde(rename = "type")]
    pub condition_type: String,
    pub parameters: Map<String, Value>,
    pub result: bool,
    pub details: Map<String, Value>,
    pub evaluation_time_ms: f64,
}

/// A reward the rule would grant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictedReward {
    #[serde(rename = "type")]
    pub reward_type: String,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    pub parameters: Map<String, Value>,
    pub name: String,
    pub description: String,
}

/// Trace of one rule evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrace {
    pub rule_id: String,
    pub name: String,
    pub description: String,
    pub trigger_matched: bool,
    pub conditions: Vec<ConditionTrace>,
    pub predicted_rewards: Vec<PredictedReward>,
    pub would_execute: bool,
    pub evaluation_time_ms: f64,
}

/// Aggregate numbers for the trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunSummary {
    pub total_rules_evaluated: usize,
    pub rules_that_would_execute: usize,
    pub total_predicted_rewards: usize,
    pub total_evaluation_time_ms: f64,
    pub event_valid: bool,
    pub validation_errors: Vec<String>,
}

/// The full dry-run result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunTrace {
    pub trigger_event_id: String,
    pub user_id: String,
    pub event_type: String,
    pub evaluated_at: DateTime<Utc>,
    pub rules: Vec<RuleTrace>,
    pub summary: DryRunSummary,
}

/// Side-effect-free rule evaluation.
pub struct Sandbox {
    rules: Arc<dyn RuleRepository>,
    engine: Arc<RuleEngine>,
    catalog: Arc<Catalog>,
}

impl Sandbox {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        engine: Arc<RuleEngine>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            rules,
            engine,
            catalog,
        }
    }

    /// Predict what `input` would produce. Reads repositories, writes
    /// nothing, enqueues nothing.
    pub async fn dry_run(&self, input: NewEvent) -> AppResult<DryRunTrace> {
        let started = Instant::now();
        let validation_errors = input.validation_errors();
        let event = input.into_event();

        let active = self.rules.list_active().await?;
        let matched: Vec<Rule> = active
            .iter()
            .filter(|r| r.should_trigger(&event.event_type))
            .cloned()
            .collect();
        let bound = self.engine.history_bound(&matched);
        let history = self.engine.history_for(&event, bound).await?;

        let mut rules = Vec::with_capacity(active.len());
        for rule in &active {
            rules.push(self.trace_rule(rule, &history, &event));
        }

        let rules_that_would_execute = rules.iter().filter(|r| r.would_execute).count();
        let total_predicted_rewards = rules.iter().map(|r| r.predicted_rewards.len()).sum();

        Ok(DryRunTrace {
            trigger_event_id: event.id,
            user_id: event.user_id,
            event_type: event.event_type,
            evaluated_at: Utc::now(),
            summary: DryRunSummary {
                total_rules_evaluated: rules.len(),
                rules_that_would_execute,
                total_predicted_rewards,
                total_evaluation_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                event_valid: validation_errors.is_empty(),
                validation_errors,
            },
            rules,
        })
    }

    fn trace_rule(&self, rule: &Rule, history: &[Event], event: &Event) -> RuleTrace {
        let started = Instant::now();
        let trigger_matched = rule.should_trigger(&event.event_type);

        let mut conditions_trace = Vec::new();
        let mut would_execute = false;

        if trigger_matched {
            if let Err(err) = validate_rule_config(rule) {
                tracing::warn!(
                    rule.id = %rule.id,
                    error.message = %err,
                    "Dry-run skipping rule with invalid configuration"
                );
            } else {
                let script_host: Option<&dyn ScriptHost> = self.engine.script_host();
                let mut any = false;
                let mut all = true;
                for condition in &rule.conditions {
                    let (outcome, elapsed_ms) = conditions::evaluate_condition_timed(
                        condition,
                        history,
                        event,
                        script_host,
                    );
                    let (result, details) = match outcome {
                        Ok(outcome) => (outcome.result, outcome.details),
                        Err(err) => {
                            let mut details = Map::new();
                            details.insert("error".to_string(), Value::String(err.to_string()));
                            (false, details)
                        }
                    };
                    any |= result;
                    all &= result;
                    conditions_trace.push(ConditionTrace {
                        condition_id: condition.id.clone(),
                        condition_type: condition.condition_type.clone(),
                        parameters: condition.params.clone(),
                        result,
                        details,
                        evaluation_time_ms: elapsed_ms,
                    });
                }
                would_execute = match rule.logic {
                    RuleLogic::All => all,
                    RuleLogic::Any => any,
                };
            }
        }

        let predicted_rewards = if would_execute {
            rule.rewards
                .iter()
                .map(|reward| {
                    let (name, description) = self.describe_target(&reward.reward_type, &reward.target_id);
                    PredictedReward {
                        reward_type: reward.reward_type.clone(),
                        target_id: reward.target_id.clone(),
                        amount: reward.amount,
                        parameters: reward.params.clone(),
                        name,
                        description,
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        RuleTrace {
            rule_id: rule.id.clone(),
            name: rule.name.clone(),
            description: rule.description.clone(),
            trigger_matched,
            conditions: conditions_trace,
            predicted_rewards,
            would_execute,
            evaluation_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// Human-readable naming for a predicted reward, resolved against the
    /// catalog when a descriptor exists.
    fn describe_target(&self, reward_type: &str, target_id: &str) -> (String, String) {
        match reward_type {
            "badge" => self
                .catalog
                .badge(target_id)
                .map(|b| (b.name.clone(), b.description.clone()))
                .unwrap_or_else(|| (target_id.to_string(), String::new())),
            "trophy" => self
                .catalog
                .trophy(target_id)
                .map(|t| (t.name.clone(), t.description.clone()))
                .unwrap_or_else(|| (target_id.to_string(), String::new())),
            _ => self
                .catalog
                .category(target_id)
                .map(|c| (c.name.clone(), String::new()))
                .unwrap_or_else(|| (target_id.to_string(), String::new())),
        }
    }
}
