use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

pub type AccountId = i64;

/// A ledger account. Only `balance` ever changes after creation, and only through
/// the repository's atomic increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    /// Balance in the smallest currency unit
    pub balance: Cents,
    /// ISO 4217 code, e.g. "USD"
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for opening a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub owner: String,
    pub balance: Cents,
    pub currency: String,
}

impl NewAccount {
    pub fn new(owner: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            balance: 0,
            currency: currency.into(),
        }
    }

    pub fn with_balance(mut self, balance: Cents) -> Self {
        self.balance = balance;
        self
    }
}
