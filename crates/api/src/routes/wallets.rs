//! Wallet routes
//!
//! Balances, transaction ledgers, spending, and the transfer state machine
//! for spendable point categories.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::catalog::PointCategory;
use crate::error::{AppError, AppResult};
use crate::shared::pagination::{Paginated, PaginationQuery};
use crate::shared::validation::Validator;
use crate::state::AppState;
use crate::store::wallet_models::{
    TransactionType, Wallet, WalletTransaction, WalletTransfer,
};

/// Create wallet routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/transfers", post(create_transfer))
        .route("/transfers/{transfer_id}", get(get_transfer))
        .route("/transfers/{transfer_id}/execute", post(execute_transfer))
        .route("/transfers/{transfer_id}/cancel", post(cancel_transfer))
        .route("/{user_id}", get(list_wallets))
        .route("/{user_id}/{category}", get(get_wallet))
        .route("/{user_id}/{category}/transactions", get(list_transactions))
        .route("/{user_id}/{category}/spend", post(spend))
}

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Balance view without the full ledger
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletSummary {
    user_id: String,
    category_id: String,
    balance: i64,
    transaction_count: usize,
}

impl From<Wallet> for WalletSummary {
    fn from(wallet: Wallet) -> Self {
        Self {
            user_id: wallet.user_id,
            category_id: wallet.category_id,
            balance: wallet.balance,
            transaction_count: wallet.transactions.len(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    #[serde(default)]
    from_user_id: String,
    #[serde(default)]
    to_user_id: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpendRequest {
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpendResponse {
    balance: i64,
    transaction: WalletTransaction,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Resolve a category that wallets can exist for.
fn spendable_category(state: &AppState, category_id: &str) -> AppResult<PointCategory> {
    let category = state
        .catalog
        .category(category_id)
        .ok_or_else(|| AppError::not_found(format!("point category {}", category_id)))?;
    if !category.is_spendable {
        return Err(AppError::validation(format!(
            "category {} is not spendable",
            category_id
        )));
    }
    Ok(category.clone())
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/wallets/{userId}
async fn list_wallets(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<WalletSummary>>> {
    let wallets = state.wallets.list_wallets(&user_id).await?;
    Ok(Json(wallets.into_iter().map(WalletSummary::from).collect()))
}

/// GET /api/wallets/{userId}/{category}
async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path((user_id, category)): Path<(String, String)>,
) -> AppResult<Json<WalletSummary>> {
    spendable_category(&state, &category)?;
    let wallet = state
        .wallets
        .get_wallet(&user_id, &category)
        .await?
        .unwrap_or_else(|| Wallet::new(&user_id, &category));
    Ok(Json(wallet.into()))
}

/// GET /api/wallets/{userId}/{category}/transactions?page&pageSize
async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path((user_id, category)): Path<(String, String)>,
    Query(query): Query<PaginationQuery>,
) -> AppResult<Json<Paginated<WalletTransaction>>> {
    spendable_category(&state, &category)?;
    let pagination = query.normalize()?;
    let (transactions, total) = state
        .wallets
        .list_transactions(&user_id, &category, pagination.page_size, pagination.offset)
        .await?;
    Ok(Json(Paginated::new(transactions, total, &pagination)))
}

/// POST /api/wallets/transfers
///
/// Creates the transfer and immediately drives it to a terminal state. An
/// insufficient balance leaves a `Failed` transfer behind and surfaces as a
/// conflict.
async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferRequest>,
) -> AppResult<(StatusCode, Json<WalletTransfer>)> {
    Validator::new()
        .required("fromUserId", &request.from_user_id)
        .required("toUserId", &request.to_user_id)
        .required("category", &request.category)
        .min("amount", request.amount, 1)
        .check(
            request.from_user_id != request.to_user_id
                || request.from_user_id.trim().is_empty(),
            "fromUserId and toUserId must differ",
        )
        .finish()?;
    let category = spendable_category(&state, &request.category)?;

    let transfer = WalletTransfer::new(
        request.from_user_id,
        request.to_user_id,
        category.id.clone(),
        request.amount,
        request.description.unwrap_or_default(),
    );
    let transfer = state.wallets.create_transfer(transfer).await?;
    tracing::info!(
        transfer.id = %transfer.id,
        category = %category.id,
        amount = transfer.amount,
        "Transfer created"
    );

    let completed = state
        .wallets
        .complete_transfer(&transfer.id, category.negative_balance_allowed)
        .await?;
    Ok((StatusCode::CREATED, Json(completed)))
}

/// GET /api/wallets/transfers/{id}
async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<String>,
) -> AppResult<Json<WalletTransfer>> {
    state
        .wallets
        .get_transfer(&transfer_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("transfer {}", transfer_id)))
}

/// POST /api/wallets/transfers/{id}/execute
///
/// Re-drives a pending transfer; terminal transfers fail with a transfer
/// state error.
async fn execute_transfer(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<String>,
) -> AppResult<Json<WalletTransfer>> {
    let transfer = state
        .wallets
        .get_transfer(&transfer_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("transfer {}", transfer_id)))?;
    let category = spendable_category(&state, &transfer.category_id)?;
    let completed = state
        .wallets
        .complete_transfer(&transfer_id, category.negative_balance_allowed)
        .await?;
    Ok(Json(completed))
}

/// POST /api/wallets/transfers/{id}/cancel
async fn cancel_transfer(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<String>,
) -> AppResult<Json<WalletTransfer>> {
    Ok(Json(state.wallets.cancel_transfer(&transfer_id).await?))
}

/// POST /api/wallets/{userId}/{category}/spend
async fn spend(
    State(state): State<Arc<AppState>>,
    Path((user_id, category)): Path<(String, String)>,
    Json(request): Json<SpendRequest>,
) -> AppResult<Json<SpendResponse>> {
    Validator::new()
        .min("amount", request.amount, 1)
        .finish()?;
    let category = spendable_category(&state, &category)?;

    let transaction = state
        .wallets
        .post_transaction(
            &user_id,
            &category.id,
            -request.amount,
            TransactionType::Spent,
            request.description.as_deref().unwrap_or("spend"),
            None,
            category.negative_balance_allowed,
        )
        .await?;
    let balance = state
        .wallets
        .get_wallet(&user_id, &category.id)
        .await?
        .map(|w| w.balance)
        .unwrap_or(0);
    Ok(Json(SpendResponse {
        balance,
        transaction,
    }))
}
