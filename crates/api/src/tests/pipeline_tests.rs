//! Pipeline tests
//!
//! End-to-end event→reward scenarios through the queue and processor, plus
//! the core invariants: history correspondence, replay idempotence, and
//! per-user ordering.

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use crate::engine::rules::RewardInstruction;
    use crate::store::reward_repos::RewardHistoryRepository;
    use crate::store::rule_models::{Condition, Reward, RuleInput};
    use crate::store::rule_repos::RuleRepository;
    use crate::store::user_repos::UserStateRepository;
    use crate::tests::helpers::{
        event_body, first_comment_rule, points_rule, server, test_state, wait_for_processed,
    };

    // ========================================================================
    // SCENARIO S1 — FIRST-COMMENT BADGE
    // ========================================================================

    #[tokio::test]
    async fn test_first_comment_awards_badge_and_points_once() {
        let state = test_state(100, 1);
        state.rules.create(first_comment_rule()).await.unwrap();

        let shutdown = CancellationToken::new();
        state.processor.start(&shutdown).await;
        let server = server(&state);

        // Event A: first comment fires the rule
        server
            .post("/api/events")
            .json(&event_body("USER_COMMENTED", "u1"))
            .await;
        wait_for_processed(&state, 1).await;

        let user = state.users.get("u1").await.unwrap().unwrap();
        assert!(user.has_badge("first-comment"));
        assert_eq!(user.points("xp"), 10);

        let (entries, total) = state.rewards.list_by_user("u1", None, None, 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert!(entries.iter().any(|e| e.reward_type == "badge" && e.success));
        assert!(entries.iter().any(|e| e.reward_type == "points" && e.success));

        // Event B: the first-occurrence condition no longer holds, so the
        // rule stays silent and nothing accrues
        server
            .post("/api/events")
            .json(&event_body("USER_COMMENTED", "u1"))
            .await;
        wait_for_processed(&state, 2).await;

        let user = state.users.get("u1").await.unwrap().unwrap();
        assert_eq!(user.points("xp"), 10);
        assert_eq!(user.badge_ids.len(), 1);
        let (_, total) = state.rewards.list_by_user("u1", None, None, 10, 0).await.unwrap();
        assert_eq!(total, 2);

        state.processor.stop().await;
    }

    // ========================================================================
    // HISTORY CORRESPONDENCE
    // ========================================================================

    #[tokio::test]
    async fn test_every_mutation_has_a_history_entry() {
        let state = test_state(100, 1);
        state.rules.create(points_rule("r1", "PING", 25)).await.unwrap();

        let shutdown = CancellationToken::new();
        state.processor.start(&shutdown).await;
        let server = server(&state);

        server.post("/api/events").json(&event_body("PING", "u1")).await;
        wait_for_processed(&state, 1).await;

        let user = state.users.get("u1").await.unwrap().unwrap();
        assert_eq!(user.points("xp"), 25);

        // The mutation is traceable back to the rule that produced it
        let (entries, _) = state.rewards.list_by_user("u1", None, None, 10, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].detail_str("ruleId"), Some("r1"));
        assert_eq!(entries[0].detail_i64("amount"), Some(25));
        assert!(entries[0].success);

        state.processor.stop().await;
    }

    // ========================================================================
    // REPLAY IDEMPOTENCE
    // ========================================================================

    #[tokio::test]
    async fn test_replaying_an_instruction_changes_nothing() {
        let state = test_state(100, 1);

        let instruction = RewardInstruction {
            rule_id: "r1".to_string(),
            rule_name: "points".to_string(),
            event_id: "evt-1".to_string(),
            user_id: "u1".to_string(),
            reward_index: 0,
            reward: Reward {
                reward_type: "points".to_string(),
                target_id: "xp".to_string(),
                amount: Some(40),
                params: Default::default(),
            },
        };

        state.applier.apply(&instruction).await.unwrap();
        let after_first = state.users.get("u1").await.unwrap().unwrap();

        state.applier.apply(&instruction).await.unwrap();
        let after_second = state.users.get("u1").await.unwrap().unwrap();

        assert_eq!(after_first.points("xp"), 40);
        assert_eq!(
            after_first.points_by_category,
            after_second.points_by_category
        );
        let (_, total) = state.rewards.list_by_user("u1", None, None, 10, 0).await.unwrap();
        assert_eq!(total, 1);
    }

    // ========================================================================
    // PER-USER ORDERING
    // ========================================================================

    #[tokio::test]
    async fn test_history_sees_earlier_events_in_order() {
        let state = test_state(100, 1);

        // Fires only once two PINGs are already in history, i.e. on the third
        let rule = RuleInput {
            id: Some("third-ping".to_string()),
            name: "third ping".to_string(),
            description: String::new(),
            triggers: vec!["PING".to_string()],
            conditions: vec![Condition {
                id: None,
                condition_type: "count".to_string(),
                params: serde_json::json!({
                    "eventType": "PING",
                    "threshold": 2,
                    "comparator": ">=",
                })
                .as_object()
                .cloned()
                .unwrap(),
            }],
            rewards: vec![Reward {
                reward_type: "points".to_string(),
                target_id: "xp".to_string(),
                amount: Some(100),
                params: Default::default(),
            }],
            logic: None,
            history_limit: None,
            is_active: Some(true),
        }
        .into_rule()
        .unwrap();
        state.rules.create(rule).await.unwrap();

        let shutdown = CancellationToken::new();
        state.processor.start(&shutdown).await;
        let server = server(&state);

        for _ in 0..3 {
            server.post("/api/events").json(&event_body("PING", "u1")).await;
        }
        wait_for_processed(&state, 3).await;

        // Exactly one award: the first two events saw too little history
        let user = state.users.get("u1").await.unwrap().unwrap();
        assert_eq!(user.points("xp"), 100);

        state.processor.stop().await;
    }

    #[tokio::test]
    async fn test_users_isolated_across_shards() {
        let state = test_state(100, 4);
        state.rules.create(first_comment_rule()).await.unwrap();

        let shutdown = CancellationToken::new();
        state.processor.start(&shutdown).await;
        let server = server(&state);

        for user in ["u1", "u2", "u3", "u4", "u5"] {
            server
                .post("/api/events")
                .json(&event_body("USER_COMMENTED", user))
                .await;
        }
        wait_for_processed(&state, 5).await;

        // Every user got exactly one first-comment award
        for user in ["u1", "u2", "u3", "u4", "u5"] {
            let loaded = state.users.get(user).await.unwrap().unwrap();
            assert!(loaded.has_badge("first-comment"), "user {}", user);
            assert_eq!(loaded.points("xp"), 10, "user {}", user);
        }

        state.processor.stop().await;
    }

    // ========================================================================
    // PROCESSOR OBSERVABILITY
    // ========================================================================

    #[tokio::test]
    async fn test_health_reports_pipeline_counters() {
        let state = test_state(100, 1);
        let shutdown = CancellationToken::new();
        state.processor.start(&shutdown).await;
        let server = server(&state);

        server.post("/api/events").json(&event_body("PING", "u1")).await;
        wait_for_processed(&state, 1).await;

        let health: serde_json::Value = server.get("/health").await.json();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["processedEvents"], 1);
        assert_eq!(health["queueDepth"], 0);

        state.processor.stop().await;
    }
}
