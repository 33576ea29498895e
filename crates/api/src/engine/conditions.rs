//! Condition evaluator
//!
//! Pure evaluation of rule conditions against `(event history, trigger
//! event)`. Condition types form a closed registry: unknown tags are an
//! invalid rule configuration, while evaluation failures inside a known
//! condition are demoted to `false` by the caller.
//!
//! History is the user's prior events in chronological order; the trigger
//! event itself is never part of it.

use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::store::event_models::Event;
use crate::store::rule_models::{Condition, RuleLogic};

/// The closed catalogue of condition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    AlwaysTrue,
    AttributeEquals,
    Count,
    Threshold,
    Sequence,
    TimeSinceLastEvent,
    FirstOccurrence,
    CustomScript,
}

impl ConditionKind {
    /// Resolve a type tag. Unknown tags surface as `InvalidRuleConfig`
    /// rather than being silently ignored.
    pub fn parse(tag: &str) -> AppResult<Self> {
        match tag {
            "alwaysTrue" => Ok(Self::AlwaysTrue),
            "attributeEquals" => Ok(Self::AttributeEquals),
            "count" => Ok(Self::Count),
            "threshold" => Ok(Self::Threshold),
            "sequence" => Ok(Self::Sequence),
            "timeSinceLastEvent" => Ok(Self::TimeSinceLastEvent),
            "firstOccurrence" => Ok(Self::FirstOccurrence),
            "customScript" => Ok(Self::CustomScript),
            other => Err(AppError::invalid_rule(format!(
                "unknown condition type '{}'",
                other
            ))),
        }
    }

    fn known_params(&self) -> &'static [&'static str] {
        match self {
            Self::AlwaysTrue => &[],
            Self::AttributeEquals => &["attributeName", "expectedValue"],
            Self::Count => &["eventType", "threshold", "comparator", "attributes"],
            Self::Threshold => &["attribute", "threshold", "comparator"],
            Self::Sequence => &["pattern", "windowSeconds"],
            Self::TimeSinceLastEvent => &["eventType", "seconds", "comparator"],
            Self::FirstOccurrence => &["eventType", "maxOccurrences"],
            // Script conditions own their parameter space
            Self::CustomScript => &[],
        }
    }
}

/// Comparator used by `count`, `threshold`, and `timeSinceLastEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparator {
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "=" | "==" => Ok(Self::Eq),
            ">=" => Ok(Self::Ge),
            ">" => Ok(Self::Gt),
            other => Err(AppError::invalid_rule(format!(
                "unknown comparator '{}'",
                other
            ))),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Gt => ">",
        }
    }

    pub fn holds_f64(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Eq => left == right,
            Self::Ge => left >= right,
            Self::Gt => left > right,
        }
    }

    pub fn holds_i64(&self, left: i64, right: i64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Eq => left == right,
            Self::Ge => left >= right,
            Self::Gt => left > right,
        }
    }
}

/// Optional host for `customScript` conditions. Without one, script
/// conditions evaluate to false.
pub trait ScriptHost: Send + Sync {
    fn evaluate(&self, condition: &Condition, history: &[Event], trigger: &Event)
        -> AppResult<bool>;
}

/// Outcome of a single condition, with diagnostic details for the sandbox.
#[derive(Debug, Clone)]
pub struct ConditionOutcome {
    pub result: bool,
    pub details: Map<String, Value>,
}

impl ConditionOutcome {
    fn of(result: bool, details: Value) -> Self {
        let details = match details {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("info".to_string(), other);
                map
            }
        };
        Self { result, details }
    }
}

/// Evaluate a condition sequence under the given aggregation logic.
///
/// Evaluator failures count as `false` for the failing condition and are
/// logged; they never abort the surrounding rule evaluation.
pub fn evaluate_conditions(
    conditions: &[Condition],
    history: &[Event],
    trigger: &Event,
    logic: RuleLogic,
    script_host: Option<&dyn ScriptHost>,
) -> bool {
    let mut any = false;
    let mut all = true;
    for condition in conditions {
        let result = match evaluate_condition(condition, history, trigger, script_host) {
            Ok(outcome) => outcome.result,
            Err(err) => {
                tracing::warn!(
                    condition.type = %condition.condition_type,
                    error.message = %err,
                    "Condition evaluation failed, treating as false"
                );
                false
            }
        };
        any |= result;
        all &= result;
    }
    match logic {
        RuleLogic::All => all,
        RuleLogic::Any => any,
    }
}

/// Evaluate one condition, returning its outcome and diagnostics.
pub fn evaluate_condition(
    condition: &Condition,
    history: &[Event],
    trigger: &Event,
    script_host: Option<&dyn ScriptHost>,
) -> AppResult<ConditionOutcome> {
    let kind = ConditionKind::parse(&condition.condition_type)?;
    warn_unknown_params(kind, condition);

    match kind {
        ConditionKind::AlwaysTrue => Ok(ConditionOutcome::of(true, json!({}))),
        ConditionKind::AttributeEquals => attribute_equals(condition, trigger),
        ConditionKind::Count => count(condition, history),
        ConditionKind::Threshold => threshold(condition, trigger),
        ConditionKind::Sequence => sequence(condition, history, trigger),
        ConditionKind::TimeSinceLastEvent => time_since_last_event(condition, history, trigger),
        ConditionKind::FirstOccurrence => first_occurrence(condition, history, trigger),
        ConditionKind::CustomScript => match script_host {
            Some(host) => {
                let result = host.evaluate(condition, history, trigger)?;
                Ok(ConditionOutcome::of(result, json!({"scripted": true})))
            }
            None => {
                tracing::warn!(
                    condition.type = "customScript",
                    "No script host registered, condition evaluates to false"
                );
                Ok(ConditionOutcome::of(false, json!({"scripted": false})))
            }
        },
    }
}

/// Evaluate one condition and measure how long it took, for the dry-run
/// trace.
pub fn evaluate_condition_timed(
    condition: &Condition,
    history: &[Event],
    trigger: &Event,
    script_host: Option<&dyn ScriptHost>,
) -> (AppResult<ConditionOutcome>, f64) {
    let started = Instant::now();
    let outcome = evaluate_condition(condition, history, trigger, script_host);
    (outcome, started.elapsed().as_secs_f64() * 1000.0)
}

// ============================================================================
// CONDITION IMPLEMENTATIONS
// ============================================================================

fn attribute_equals(condition: &Condition, trigger: &Event) -> AppResult<ConditionOutcome> {
    let attribute = require_str(condition, "attributeName")?;
    let expected = condition
        .params
        .get("expectedValue")
        .ok_or_else(|| missing_param(condition, "expectedValue"))?;

    // Missing is distinct from null and never equal to anything.
    let outcome = match trigger.attribute(attribute) {
        None => ConditionOutcome::of(
            false,
            json!({"attribute": attribute, "expected": expected, "actual": "missing"}),
        ),
        Some(actual) => ConditionOutcome::of(
            values_equal(actual, expected),
            json!({"attribute": attribute, "expected": expected, "actual": actual}),
        ),
    };
    Ok(outcome)
}

fn count(condition: &Condition, history: &[Event]) -> AppResult<ConditionOutcome> {
    let event_type = require_str(condition, "eventType")?;
    let threshold = require_i64(condition, "threshold")?;
    let comparator = comparator_param(condition, Comparator::Ge)?;
    let filters = condition
        .params
        .get("attributes")
        .and_then(Value::as_object);

    let matched = history
        .iter()
        .filter(|e| e.is_type(event_type))
        .filter(|e| {
            filters.is_none_or(|wanted| {
                wanted.iter().all(|(key, expected)| {
                    e.attribute(key)
                        .map(|actual| values_equal(actual, expected))
                        .unwrap_or(false)
                })
            })
        })
        .count() as i64;

    Ok(ConditionOutcome::of(
        comparator.holds_i64(matched, threshold),
        json!({
            "eventType": event_type,
            "matched": matched,
            "comparator": comparator.symbol(),
            "threshold": threshold,
        }),
    ))
}

fn threshold(condition: &Condition, trigger: &Event) -> AppResult<ConditionOutcome> {
    let attribute = require_str(condition, "attribute")?;
    let bound = require_f64(condition, "threshold")?;
    let comparator = comparator_param(condition, Comparator::Ge)?;

    let Some(actual) = trigger.attribute(attribute).and_then(numeric) else {
        return Ok(ConditionOutcome::of(
            false,
            json!({"attribute": attribute, "actual": "missing or not numeric"}),
        ));
    };

    Ok(ConditionOutcome::of(
        comparator.holds_f64(actual, bound),
        json!({
            "attribute": attribute,
            "actual": actual,
            "comparator": comparator.symbol(),
            "threshold": bound,
        }),
    ))
}

fn sequence(condition: &Condition, history: &[Event], trigger: &Event) -> AppResult<ConditionOutcome> {
    let pattern: Vec<String> = condition
        .params
        .get("pattern")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .filter(|p: &Vec<String>| !p.is_empty())
        .ok_or_else(|| missing_param(condition, "pattern"))?;

    if history.len() < pattern.len() {
        return Ok(ConditionOutcome::of(
            false,
            json!({"pattern": pattern, "historyLength": history.len()}),
        ));
    }

    let window = &history[history.len() - pattern.len()..];
    let types_match = window
        .iter()
        .zip(pattern.iter())
        .all(|(event, wanted)| event.is_type(wanted));

    let mut within_window = true;
    if let Some(max_seconds) = f64_param(condition, "windowSeconds") {
        let elapsed = (trigger.occurred_at - window[0].occurred_at).num_milliseconds() as f64
            / 1000.0;
        within_window = elapsed <= max_seconds;
    }

    Ok(ConditionOutcome::of(
        types_match && within_window,
        json!({
            "pattern": pattern,
            "matched": types_match,
            "withinWindow": within_window,
        }),
    ))
}

fn time_since_last_event(
    condition: &Condition,
    history: &[Event],
    trigger: &Event,
) -> AppResult<ConditionOutcome> {
    let event_type = require_str(condition, "eventType")?;
    let bound = require_f64(condition, "seconds")?;
    let comparator = comparator_param(condition, Comparator::Gt)?;

    let prior = history.iter().rev().find(|e| e.is_type(event_type));
    let outcome = match prior {
        // No prior event reads as infinitely long ago.
        None => ConditionOutcome::of(
            matches!(comparator, Comparator::Gt | Comparator::Ge),
            json!({"eventType": event_type, "elapsedSeconds": "none"}),
        ),
        Some(previous) => {
            let elapsed =
                (trigger.occurred_at - previous.occurred_at).num_milliseconds() as f64 / 1000.0;
            ConditionOutcome::of(
                comparator.holds_f64(elapsed, bound),
                json!({
                    "eventType": event_type,
                    "elapsedSeconds": elapsed,
                    "comparator": comparator.symbol(),
                    "seconds": bound,
                }),
            )
        }
    };
    Ok(outcome)
}

fn first_occurrence(
    condition: &Condition,
    history: &[Event],
    trigger: &Event,
) -> AppResult<ConditionOutcome> {
    let event_type = str_param(condition, "eventType")
        .unwrap_or(&trigger.event_type)
        .to_string();
    let max_occurrences = i64_param(condition, "maxOccurrences").unwrap_or(1);

    // The trigger event counts as one occurrence on top of prior history.
    let prior = history.iter().filter(|e| e.is_type(&event_type)).count() as i64;
    let result = max_occurrences >= 1 && prior < max_occurrences;

    Ok(ConditionOutcome::of(
        result,
        json!({
            "eventType": event_type,
            "priorOccurrences": prior,
            "maxOccurrences": max_occurrences,
        }),
    ))
}

// ============================================================================
// VALUE AND PARAMETER HELPERS
// ============================================================================

/// Numeric view of a JSON value, accepting numbers and numeric strings.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Value equality with numeric/string coercion.
///
/// When either side is a JSON number and both sides are numeric-coercible,
/// the comparison is numeric; otherwise equality is strict (string equality
/// stays case-sensitive).
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual.is_number() || expected.is_number() {
        if let (Some(a), Some(b)) = (numeric(actual), numeric(expected)) {
            return a == b;
        }
    }
    actual == expected
}

fn str_param<'a>(condition: &'a Condition, key: &str) -> Option<&'a str> {
    condition.params.get(key).and_then(Value::as_str)
}

fn i64_param(condition: &Condition, key: &str) -> Option<i64> {
    match condition.params.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn f64_param(condition: &Condition, key: &str) -> Option<f64> {
    condition.params.get(key).and_then(numeric)
}

fn require_str<'a>(condition: &'a Condition, key: &str) -> AppResult<&'a str> {
    str_param(condition, key).ok_or_else(|| missing_param(condition, key))
}

fn require_i64(condition: &Condition, key: &str) -> AppResult<i64> {
    i64_param(condition, key).ok_or_else(|| missing_param(condition, key))
}

fn require_f64(condition: &Condition, key: &str) -> AppResult<f64> {
    f64_param(condition, key).ok_or_else(|| missing_param(condition, key))
}

fn comparator_param(condition: &Condition, default: Comparator) -> AppResult<Comparator> {
    match str_param(condition, "comparator") {
        Some(raw) => Comparator::parse(raw),
        None => Ok(default),
    }
}

fn missing_param(condition: &Condition, key: &str) -> AppError {
    AppError::invalid_rule(format!(
        "condition '{}' requires parameter '{}'",
        condition.condition_type, key
    ))
}

fn warn_unknown_params(kind: ConditionKind, condition: &Condition) {
    if kind == ConditionKind::CustomScript {
        return;
    }
    let known = kind.known_params();
    for key in condition.params.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!(
                condition.type = %condition.condition_type,
                param = %key,
                "Ignoring unknown condition parameter"
            );
        }
    }
}
