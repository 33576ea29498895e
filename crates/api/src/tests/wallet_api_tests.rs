//! Wallet API tests
//!
//! Transfers (including the S5 scenario and the conservation invariant),
//! ledgers, and spending through the HTTP surface.

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::store::wallet_models::TransactionType;
    use crate::store::wallet_repos::WalletRepository;
    use crate::tests::helpers::{server, test_state};

    async fn seed_balance(wallets: &dyn WalletRepository, user_id: &str, amount: i64) {
        wallets
            .post_transaction(
                user_id,
                "xp",
                amount,
                TransactionType::Earned,
                "seed",
                None,
                false,
            )
            .await
            .unwrap();
    }

    fn transfer_body(from: &str, to: &str, amount: i64) -> Value {
        json!({
            "fromUserId": from,
            "toUserId": to,
            "category": "xp",
            "amount": amount,
        })
    }

    // ========================================================================
    // SCENARIO S5 — TRANSFER
    // ========================================================================

    #[tokio::test]
    async fn test_transfer_moves_funds_and_rejects_replay() {
        let state = test_state(100, 1);
        seed_balance(state.wallets.as_ref(), "u1", 100).await;
        let server = server(&state);

        let response = server
            .post("/api/wallets/transfers")
            .json(&transfer_body("u1", "u2", 30))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);

        let transfer: Value = response.json();
        assert_eq!(transfer["status"], "Completed");
        assert!(transfer["completedAt"].is_string());
        let transfer_id = transfer["id"].as_str().unwrap();

        // Balances moved 70 / 30
        let from: Value = server.get("/api/wallets/u1/xp").await.json();
        let to: Value = server.get("/api/wallets/u2/xp").await.json();
        assert_eq!(from["balance"], 70);
        assert_eq!(to["balance"], 30);

        // Conservation: the pair nets to zero and references the transfer
        let out: Value = server.get("/api/wallets/u1/xp/transactions").await.json();
        let entry = &out["items"][0];
        assert_eq!(entry["type"], "TransferOut");
        assert_eq!(entry["amount"], -30);
        assert_eq!(entry["referenceId"], transfer_id);

        let incoming: Value = server.get("/api/wallets/u2/xp/transactions").await.json();
        let entry = &incoming["items"][0];
        assert_eq!(entry["type"], "TransferIn");
        assert_eq!(entry["amount"], 30);
        assert_eq!(entry["referenceId"], transfer_id);

        // Driving the same transfer again is a state error
        let replay = server
            .post(&format!("/api/wallets/transfers/{}/execute", transfer_id))
            .await;
        assert_eq!(replay.status_code(), StatusCode::CONFLICT);
        let body: Value = replay.json();
        assert!(body["error"].as_str().unwrap().contains("Transfer state"));

        // And the balances did not move again
        let from: Value = server.get("/api/wallets/u1/xp").await.json();
        assert_eq!(from["balance"], 70);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance() {
        let state = test_state(100, 1);
        seed_balance(state.wallets.as_ref(), "u1", 10).await;
        let server = server(&state);

        let response = server
            .post("/api/wallets/transfers")
            .json(&transfer_body("u1", "u2", 30))
            .await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
        let body: Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("balance"));

        // Sender untouched, receiver never created
        let from: Value = server.get("/api/wallets/u1/xp").await.json();
        assert_eq!(from["balance"], 10);
        let to: Value = server.get("/api/wallets/u2/xp").await.json();
        assert_eq!(to["balance"], 0);
    }

    #[tokio::test]
    async fn test_transfer_validation() {
        let state = test_state(100, 1);
        let server = server(&state);

        // Non-positive amount
        let response = server
            .post("/api/wallets/transfers")
            .json(&transfer_body("u1", "u2", 0))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        // Self transfer
        let response = server
            .post("/api/wallets/transfers")
            .json(&transfer_body("u1", "u1", 10))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        // Unknown category
        let response = server
            .post("/api/wallets/transfers")
            .json(&json!({
                "fromUserId": "u1",
                "toUserId": "u2",
                "category": "mana",
                "amount": 10,
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_transfer_and_missing() {
        let state = test_state(100, 1);
        seed_balance(state.wallets.as_ref(), "u1", 100).await;
        let server = server(&state);

        let created: Value = server
            .post("/api/wallets/transfers")
            .json(&transfer_body("u1", "u2", 10))
            .await
            .json();
        let id = created["id"].as_str().unwrap();

        let fetched = server.get(&format!("/api/wallets/transfers/{}", id)).await;
        assert_eq!(fetched.status_code(), StatusCode::OK);

        let missing = server.get("/api/wallets/transfers/no-such-transfer").await;
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    // ========================================================================
    // SPEND
    // ========================================================================

    #[tokio::test]
    async fn test_spend_reduces_balance() {
        let state = test_state(100, 1);
        seed_balance(state.wallets.as_ref(), "u1", 100).await;
        let server = server(&state);

        let response = server
            .post("/api/wallets/u1/xp/spend")
            .json(&json!({"amount": 40, "description": "reward shop"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["balance"], 60);
        assert_eq!(body["transaction"]["type"], "Spent");
        assert_eq!(body["transaction"]["amount"], -40);
    }

    #[tokio::test]
    async fn test_spend_cannot_overdraw() {
        let state = test_state(100, 1);
        seed_balance(state.wallets.as_ref(), "u1", 20).await;
        let server = server(&state);

        let response = server
            .post("/api/wallets/u1/xp/spend")
            .json(&json!({"amount": 50}))
            .await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);

        let wallet: Value = server.get("/api/wallets/u1/xp").await.json();
        assert_eq!(wallet["balance"], 20);
    }

    // ========================================================================
    // LISTINGS
    // ========================================================================

    #[tokio::test]
    async fn test_wallet_listing_and_ledger_pagination() {
        let state = test_state(100, 1);
        for i in 1..=5 {
            seed_balance(state.wallets.as_ref(), "u1", i).await;
        }
        let server = server(&state);

        let wallets: Value = server.get("/api/wallets/u1").await.json();
        assert_eq!(wallets.as_array().unwrap().len(), 1);
        assert_eq!(wallets[0]["balance"], 15);
        assert_eq!(wallets[0]["transactionCount"], 5);

        let page: Value = server
            .get("/api/wallets/u1/xp/transactions")
            .add_query_param("page", "2")
            .add_query_param("pageSize", "2")
            .await
            .json();
        assert_eq!(page["total"], 5);
        assert_eq!(page["items"].as_array().unwrap().len(), 2);
        assert_eq!(page["totalPages"], 3);
    }

    #[tokio::test]
    async fn test_non_spendable_category_rejected() {
        let state = test_state(100, 1);
        let server = server(&state);

        let response = server.get("/api/wallets/u1/mana").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }
}
