//! Wallet repository
//!
//! Port plus in-memory backing for balances, ledgers, and transfers. The
//! store-wide write lock is the critical section: a posted transaction and
//! its balance change land together, and a completed transfer debits and
//! credits both wallets under one lock acquisition.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::wallet_models::{
    TransactionType, TransferStatus, Wallet, WalletTransaction, WalletTransfer,
};
use crate::error::{AppError, AppResult};

/// Port for wallet balances, ledgers, and transfers.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn get_wallet(&self, user_id: &str, category_id: &str) -> AppResult<Option<Wallet>>;

    /// All wallets for a user, sorted by category id.
    async fn list_wallets(&self, user_id: &str) -> AppResult<Vec<Wallet>>;

    /// Post a signed transaction against a wallet, creating the wallet on
    /// first touch. When `allow_negative` is false the post fails with
    /// `InsufficientBalance` instead of taking the balance below zero.
    async fn post_transaction(
        &self,
        user_id: &str,
        category_id: &str,
        amount: i64,
        transaction_type: TransactionType,
        description: &str,
        reference_id: Option<String>,
        allow_negative: bool,
    ) -> AppResult<WalletTransaction>;

    /// Page through a wallet's ledger, newest first.
    async fn list_transactions(
        &self,
        user_id: &str,
        category_id: &str,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<WalletTransaction>, usize)>;

    /// Register a new pending transfer.
    async fn create_transfer(&self, transfer: WalletTransfer) -> AppResult<WalletTransfer>;

    async fn get_transfer(&self, id: &str) -> AppResult<Option<WalletTransfer>>;

    /// Drive a pending transfer to `Completed`: debit the sender, credit the
    /// receiver, and write the paired TransferOut/TransferIn entries, all
    /// under one critical section. Insufficient funds transition the
    /// transfer to `Failed` and surface `InsufficientBalance`; any
    /// non-pending starting state is a `TransferStateError`.
    async fn complete_transfer(
        &self,
        id: &str,
        allow_negative: bool,
    ) -> AppResult<WalletTransfer>;

    /// Pending → Cancelled.
    async fn cancel_transfer(&self, id: &str) -> AppResult<WalletTransfer>;
}

/// In-memory wallet store.
#[derive(Default)]
pub struct MemoryWalletRepository {
    inner: RwLock<WalletStore>,
}

#[derive(Default)]
struct WalletStore {
    /// Keyed by (user id, category id)
    wallets: HashMap<(String, String), Wallet>,
    transfers: HashMap<String, WalletTransfer>,
}

impl MemoryWalletRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl WalletStore {
    fn wallet_mut(&mut self, user_id: &str, category_id: &str) -> &mut Wallet {
        self.wallets
            .entry((user_id.to_string(), category_id.to_string()))
            .or_insert_with(|| Wallet::new(user_id, category_id))
    }

    fn post(
        &mut self,
        user_id: &str,
        category_id: &str,
        amount: i64,
        transaction_type: TransactionType,
        description: &str,
        reference_id: Option<String>,
        allow_negative: bool,
    ) -> AppResult<WalletTransaction> {
        let wallet = self.wallet_mut(user_id, category_id);
        let new_balance = wallet.balance + amount;
        if new_balance < 0 && !allow_negative {
            return Err(AppError::insufficient_balance(format!(
                "balance {} in category {} cannot cover {}",
                wallet.balance, category_id, amount
            )));
        }
        let transaction = WalletTransaction::new(
            user_id,
            category_id,
            amount,
            transaction_type,
            description,
            reference_id,
        );
        wallet.balance = new_balance;
        wallet.transactions.push(transaction.clone());
        Ok(transaction)
    }
}

#[async_trait]
impl WalletRepository for MemoryWalletRepository {
    async fn get_wallet(&self, user_id: &str, category_id: &str) -> AppResult<Option<Wallet>> {
        let store = self.inner.read().await;
        Ok(store
            .wallets
            .get(&(user_id.to_string(), category_id.to_string()))
            .cloned())
    }

    async fn list_wallets(&self, user_id: &str) -> AppResult<Vec<Wallet>> {
        let store = self.inner.read().await;
        let mut wallets: Vec<Wallet> = store
            .wallets
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        wallets.sort_by(|a, b| a.category_id.cmp(&b.category_id));
        Ok(wallets)
    }

    async fn post_transaction(
        &self,
        user_id: &str,
        category_id: &str,
        amount: i64,
        transaction_type: TransactionType,
        description: &str,
        reference_id: Option<String>,
        allow_negative: bool,
    ) -> AppResult<WalletTransaction> {
        let mut store = self.inner.write().await;
        store.post(
            user_id,
            category_id,
            amount,
            transaction_type,
            description,
            reference_id,
            allow_negative,
        )
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        category_id: &str,
        limit: usize,
        offset: usize,
    ) -> AppResult<(Vec<WalletTransaction>, usize)> {
        let store = self.inner.read().await;
        let Some(wallet) = store
            .wallets
            .get(&(user_id.to_string(), category_id.to_string()))
        else {
            return Ok((Vec::new(), 0));
        };
        let mut transactions = wallet.transactions.clone();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = transactions.len();
        let page = transactions.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn create_transfer(&self, transfer: WalletTransfer) -> AppResult<WalletTransfer> {
        let mut store = self.inner.write().await;
        if store.transfers.contains_key(&transfer.id) {
            return Err(AppError::transfer_state(format!(
                "transfer {} already exists",
                transfer.id
            )));
        }
        store
            .transfers
            .insert(transfer.id.clone(), transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&self, id: &str) -> AppResult<Option<WalletTransfer>> {
        let store = self.inner.read().await;
        Ok(store.transfers.get(id).cloned())
    }

    async fn complete_transfer(
        &self,
        id: &str,
        allow_negative: bool,
    ) -> AppResult<WalletTransfer> {
        let mut store = self.inner.write().await;

        let transfer = store
            .transfers
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("transfer {}", id)))?;
        if transfer.status != TransferStatus::Pending {
            return Err(AppError::transfer_state(format!(
                "transfer {} is {} and cannot be completed",
                id, transfer.status
            )));
        }

        let description = format!(
            "Transfer {} -> {}",
            transfer.from_user_id, transfer.to_user_id
        );
        let debit = store.post(
            &transfer.from_user_id,
            &transfer.category_id,
            -transfer.amount,
            TransactionType::TransferOut,
            &description,
            Some(transfer.id.clone()),
            allow_negative,
        );

        match debit {
            Err(err) => {
                // Balance untouched; record the terminal failure.
                let stored = store
                    .transfers
                    .get_mut(id)
                    .expect("transfer present under lock");
                stored.status = TransferStatus::Failed;
                stored.completed_at = Some(Utc::now());
                stored.failure_reason = Some(err.to_string());
                Err(err)
            }
            Ok(_) => {
                // Credits always succeed, so the pair lands atomically.
                store
                    .post(
                        &transfer.to_user_id,
                        &transfer.category_id,
                        transfer.amount,
                        TransactionType::TransferIn,
                        &description,
                        Some(transfer.id.clone()),
                        true,
                    )
                    .expect("credit cannot violate the balance floor");
                let stored = store
                    .transfers
                    .get_mut(id)
                    .expect("transfer present under lock");
                stored.status = TransferStatus::Completed;
                stored.completed_at = Some(Utc::now());
                Ok(stored.clone())
            }
        }
    }

    async fn cancel_transfer(&self, id: &str) -> AppResult<WalletTransfer> {
        let mut store = self.inner.write().await;
        let transfer = store
            .transfers
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("transfer {}", id)))?;
        if transfer.status != TransferStatus::Pending {
            return Err(AppError::transfer_state(format!(
                "transfer {} is {} and cannot be cancelled",
                id, transfer.status
            )));
        }
        transfer.status = TransferStatus::Cancelled;
        transfer.completed_at = Some(Utc::now());
        Ok(transfer.clone())
    }
}
