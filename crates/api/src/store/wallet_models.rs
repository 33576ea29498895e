//! Wallet models
//!
//! Ledger-backed balances for spendable point categories, plus the transfer
//! state machine. A wallet owns its transaction ledger; transfers connect
//! wallets by user id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger entry type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum TransactionType {
    Earned,
    Spent,
    TransferOut,
    TransferIn,
    Refund,
    Penalty,
    Adjustment,
}

/// A single ledger entry. Amounts are signed; debits are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn new(
        user_id: impl Into<String>,
        category_id: impl Into<String>,
        amount: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            category_id: category_id.into(),
            amount,
            transaction_type,
            description: description.into(),
            reference_id,
            created_at: Utc::now(),
        }
    }
}

/// A per-(user, category) balance with its owned ledger.
///
/// The balance and the ledger move together: a transaction is either
/// recorded and reflected in the balance, or neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: String,
    pub category_id: String,
    pub balance: i64,
    #[serde(default)]
    pub transactions: Vec<WalletTransaction>,
}

impl Wallet {
    pub fn new(user_id: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            category_id: category_id.into(),
            balance: 0,
            transactions: Vec::new(),
        }
    }
}

/// Transfer lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

/// A wallet-to-wallet transfer.
///
/// Transitions are allowed only out of `Pending`; every terminal transition
/// sets `completed_at`, and `Failed` carries a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransfer {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub category_id: String,
    pub amount: i64,
    pub status: TransferStatus,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl WalletTransfer {
    pub fn new(
        from_user_id: impl Into<String>,
        to_user_id: impl Into<String>,
        category_id: impl Into<String>,
        amount: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_user_id: from_user_id.into(),
            to_user_id: to_user_id.into(),
            category_id: category_id.into(),
            amount,
            status: TransferStatus::Pending,
            description: description.into(),
            created_at: Utc::now(),
            completed_at: None,
            failure_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_transaction_type_round_trip() {
        assert_eq!(TransactionType::TransferOut.to_string(), "TransferOut");
        assert_eq!(
            TransactionType::from_str("Penalty").unwrap(),
            TransactionType::Penalty
        );
    }

    #[test]
    fn test_transfer_status_terminality() {
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
    }
}
