use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Account, AccountId, Cents, Entry};

pub type TransferId = i64;

/// A recorded movement of money from one account to another.
/// Transfers are immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    /// Source account (balance decreases)
    pub from_account_id: AccountId,
    /// Destination account (balance increases)
    pub to_account_id: AccountId,
    /// Always positive
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

/// Input to a transfer transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Cents,
}

impl TransferParams {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Cents) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Check the preconditions that can be verified without touching the store.
    pub fn validate(&self) -> Result<(), InvalidTransfer> {
        if self.from_account_id == self.to_account_id {
            return Err(InvalidTransfer::SameAccount(self.from_account_id));
        }
        if self.amount <= 0 {
            return Err(InvalidTransfer::NonPositiveAmount(self.amount));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransfer {
    #[error("cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("transfer amount must be positive, got {0}")]
    NonPositiveAmount(Cents),
}

/// Everything a committed transfer produced. Accounts reflect their
/// balances after both adjustments were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}
