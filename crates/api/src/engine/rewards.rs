//! Reward applier
//!
//! Turns reward instructions into user-state, wallet, and history mutations.
//! Every attempt writes exactly one history entry whose id is composed from
//! `(rule_id, event_id, reward_index)`, which makes replays of the same
//! instruction no-ops.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::catalog::{Aggregation, Catalog, PointCategory};
use crate::engine::rules::RewardInstruction;
use crate::error::{AppError, AppResult};
use crate::store::reward_models::RewardHistoryEntry;
use crate::store::reward_repos::RewardHistoryRepository;
use crate::store::user_models::UserState;
use crate::store::user_repos::UserStateRepository;
use crate::store::wallet_models::TransactionType;
use crate::store::wallet_repos::WalletRepository;

/// The closed catalogue of reward types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    Points,
    Badge,
    Trophy,
    Level,
    Penalty,
}

impl RewardKind {
    /// Resolve a type tag; unknown tags are an invalid rule configuration.
    pub fn parse(tag: &str) -> AppResult<Self> {
        match tag {
            "points" => Ok(Self::Points),
            "badge" => Ok(Self::Badge),
            "trophy" => Ok(Self::Trophy),
            "level" => Ok(Self::Level),
            "penalty" => Ok(Self::Penalty),
            other => Err(AppError::invalid_rule(format!(
                "unknown reward type '{}'",
                other
            ))),
        }
    }
}

/// What happened to one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State mutated (or idempotent grant confirmed) and history written
    Applied,
    /// The instruction's history entry already existed; nothing was done
    AlreadyApplied,
    /// The attempt was recorded with `success=false`
    Failed,
}

/// Mutates user state, wallets, and the reward log.
pub struct RewardApplier {
    users: Arc<dyn UserStateRepository>,
    wallets: Arc<dyn WalletRepository>,
    history: Arc<dyn RewardHistoryRepository>,
    catalog: Arc<Catalog>,
}

impl RewardApplier {
    pub fn new(
        users: Arc<dyn UserStateRepository>,
        wallets: Arc<dyn WalletRepository>,
        history: Arc<dyn RewardHistoryRepository>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            users,
            wallets,
            history,
            catalog,
        }
    }

    /// Apply a batch, continuing past per-instruction failures.
    pub async fn apply_all(&self, instructions: &[RewardInstruction]) -> AppResult<usize> {
        let mut applied = 0;
        for instruction in instructions {
            match self.apply(instruction).await {
                Ok(ApplyOutcome::Applied) => applied += 1,
                Ok(_) => {}
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::error!(
                        rule.id = %instruction.rule_id,
                        event.id = %instruction.event_id,
                        error.message = %err,
                        "Reward application failed"
                    );
                }
            }
        }
        Ok(applied)
    }

    /// Apply a single instruction idempotently.
    pub async fn apply(&self, instruction: &RewardInstruction) -> AppResult<ApplyOutcome> {
        let entry_id = RewardHistoryEntry::compose_id(
            &instruction.rule_id,
            &instruction.event_id,
            instruction.reward_index,
        );
        if self.history.exists(&entry_id).await? {
            tracing::debug!(entry.id = %entry_id, "Instruction already applied, skipping replay");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let kind = match RewardKind::parse(&instruction.reward.reward_type) {
            Ok(kind) => kind,
            Err(err) => {
                return self
                    .record_failure(instruction, &entry_id, Map::new(), err.to_string())
                    .await;
            }
        };

        match kind {
            RewardKind::Points => self.apply_points(instruction, &entry_id, false).await,
            RewardKind::Badge => self.apply_badge(instruction, &entry_id).await,
            RewardKind::Trophy => self.apply_trophy(instruction, &entry_id).await,
            RewardKind::Level => self.apply_level(instruction, &entry_id).await,
            RewardKind::Penalty => self.apply_penalty(instruction, &entry_id).await,
        }
    }

    async fn apply_points(
        &self,
        instruction: &RewardInstruction,
        entry_id: &str,
        negate: bool,
    ) -> AppResult<ApplyOutcome> {
        let reward = &instruction.reward;
        let category_id = reward.target_id.clone();

        let Some(amount) = reward.amount else {
            return self
                .record_failure(
                    instruction,
                    entry_id,
                    details(json!({"category": category_id})),
                    "points reward requires an amount".to_string(),
                )
                .await;
        };
        let multiplier = reward
            .params
            .get("multiplier")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let mut delta = amount * multiplier;
        if negate {
            delta = -delta.abs();
        }

        let Some(category) = self.catalog.category(&category_id).cloned() else {
            return self
                .record_failure(
                    instruction,
                    entry_id,
                    details(json!({"category": category_id, "amount": delta})),
                    format!("unknown point category '{}'", category_id),
                )
                .await;
        };

        // Wallet first: when the ledger refuses the debit the user state must
        // stay untouched.
        if category.is_spendable {
            let transaction_type = if delta >= 0 {
                TransactionType::Earned
            } else {
                TransactionType::Penalty
            };
            let posted = self
                .wallets
                .post_transaction(
                    &instruction.user_id,
                    &category.id,
                    delta,
                    transaction_type,
                    &instruction.rule_name,
                    Some(entry_id.to_string()),
                    category.negative_balance_allowed,
                )
                .await;
            if let Err(err) = posted {
                if matches!(err, AppError::InsufficientBalance(_)) {
                    return self
                        .record_failure(
                            instruction,
                            entry_id,
                            details(json!({"category": category.id, "amount": delta})),
                            err.to_string(),
                        )
                        .await;
                }
                return Err(err);
            }
        }

        let mut state = self.users.get_or_create(&instruction.user_id).await?;
        let current = state.points(&category.id);
        let total = match category.aggregation {
            Aggregation::Sum => current + delta,
            Aggregation::Max => current.max(delta),
            Aggregation::Last => delta,
        };
        state.points_by_category.insert(category.id.clone(), total);
        let level = self.refresh_level(&mut state, &category);
        self.users.save(state).await?;

        let mut entry_details = details(json!({
            "category": category.id,
            "amount": delta,
            "multiplier": multiplier,
            "total": total,
        }));
        if let Some(level_id) = level {
            entry_details.insert("level".to_string(), Value::String(level_id));
        }
        self.record_success(instruction, entry_id, entry_details)
            .await
    }

    async fn apply_badge(
        &self,
        instruction: &RewardInstruction,
        entry_id: &str,
    ) -> AppResult<ApplyOutcome> {
        let badge_id = instruction.reward.target_id.clone();
        if self.catalog.badge(&badge_id).is_none() {
            tracing::warn!(badge.id = %badge_id, "Granting badge without catalog descriptor");
        }

        let mut state = self.users.get_or_create(&instruction.user_id).await?;
        if state.has_badge(&badge_id) {
            // Idempotent: the grant is confirmed, not repeated.
            return self
                .record_success(
                    instruction,
                    entry_id,
                    details(json!({"badgeId": badge_id, "duplicate": true})),
                )
                .await;
        }

        state.badge_ids.insert(badge_id.clone());
        self.users.save(state).await?;
        self.record_success(instruction, entry_id, details(json!({"badgeId": badge_id})))
            .await
    }

    async fn apply_trophy(
        &self,
        instruction: &RewardInstruction,
        entry_id: &str,
    ) -> AppResult<ApplyOutcome> {
        let trophy_id = instruction.reward.target_id.clone();
        if self.catalog.trophy(&trophy_id).is_none() {
            tracing::warn!(trophy.id = %trophy_id, "Granting trophy without catalog descriptor");
        }

        let mut state = self.users.get_or_create(&instruction.user_id).await?;
        if state.has_trophy(&trophy_id) {
            return self
                .record_success(
                    instruction,
                    entry_id,
                    details(json!({"trophyId": trophy_id, "duplicate": true})),
                )
                .await;
        }

        state.trophy_ids.insert(trophy_id.clone());
        self.users.save(state).await?;
        self.record_success(
            instruction,
            entry_id,
            details(json!({"trophyId": trophy_id})),
        )
        .await
    }

    async fn apply_level(
        &self,
        instruction: &RewardInstruction,
        entry_id: &str,
    ) -> AppResult<ApplyOutcome> {
        let category_id = instruction.reward.target_id.clone();
        let Some(category) = self.catalog.category(&category_id).cloned() else {
            return self
                .record_failure(
                    instruction,
                    entry_id,
                    details(json!({"category": category_id})),
                    format!("unknown point category '{}'", category_id),
                )
                .await;
        };

        let mut state = self.users.get_or_create(&instruction.user_id).await?;
        let level = self.refresh_level(&mut state, &category);
        self.users.save(state).await?;

        self.record_success(
            instruction,
            entry_id,
            details(json!({
                "category": category.id,
                "level": level,
            })),
        )
        .await
    }

    async fn apply_penalty(
        &self,
        instruction: &RewardInstruction,
        entry_id: &str,
    ) -> AppResult<ApplyOutcome> {
        // A penalty either revokes a badge or applies negative points.
        if let Some(badge_id) = instruction
            .reward
            .params
            .get("badgeId")
            .and_then(Value::as_str)
        {
            let mut state = self.users.get_or_create(&instruction.user_id).await?;
            let revoked = state.badge_ids.remove(badge_id);
            if revoked {
                self.users.save(state).await?;
            }
            return self
                .record_success(
                    instruction,
                    entry_id,
                    details(json!({"badgeId": badge_id, "revoked": revoked})),
                )
                .await;
        }

        self.apply_points(instruction, entry_id, true).await
    }

    /// Recompute the user's level in a category against the catalog. Returns
    /// the resolved level id, if any.
    fn refresh_level(&self, state: &mut UserState, category: &PointCategory) -> Option<String> {
        if self.catalog.levels_for(&category.id).is_empty() {
            return None;
        }
        let points = state.points(&category.id);
        match self.catalog.level_for_points(&category.id, points) {
            Some(level) => {
                state
                    .current_level_by_category
                    .insert(category.id.clone(), level.id.clone());
                Some(level.id.clone())
            }
            None => {
                state.current_level_by_category.remove(&category.id);
                None
            }
        }
    }

    async fn record_success(
        &self,
        instruction: &RewardInstruction,
        entry_id: &str,
        mut entry_details: Map<String, Value>,
    ) -> AppResult<ApplyOutcome> {
        stamp_provenance(&mut entry_details, instruction);
        let written = self
            .history
            .record(RewardHistoryEntry {
                id: entry_id.to_string(),
                user_id: instruction.user_id.clone(),
                reward_type: instruction.reward.reward_type.clone(),
                details: entry_details,
                success: true,
                awarded_at: chrono::Utc::now(),
                failure_reason: None,
            })
            .await?;
        Ok(if written {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::AlreadyApplied
        })
    }

    async fn record_failure(
        &self,
        instruction: &RewardInstruction,
        entry_id: &str,
        mut entry_details: Map<String, Value>,
        reason: String,
    ) -> AppResult<ApplyOutcome> {
        tracing::warn!(
            rule.id = %instruction.rule_id,
            event.id = %instruction.event_id,
            reason = %reason,
            "Reward attempt failed"
        );
        stamp_provenance(&mut entry_details, instruction);
        self.history
            .record(RewardHistoryEntry {
                id: entry_id.to_string(),
                user_id: instruction.user_id.clone(),
                reward_type: instruction.reward.reward_type.clone(),
                details: entry_details,
                success: false,
                awarded_at: chrono::Utc::now(),
                failure_reason: Some(reason),
            })
            .await?;
        Ok(ApplyOutcome::Failed)
    }
}

fn details(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn stamp_provenance(entry_details: &mut Map<String, Value>, instruction: &RewardInstruction) {
    entry_details.insert(
        "ruleId".to_string(),
        Value::String(instruction.rule_id.clone()),
    );
    entry_details.insert(
        "eventId".to_string(),
        Value::String(instruction.event_id.clone()),
    );
}
