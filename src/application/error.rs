use thiserror::Error;

use crate::domain::{AccountId, InvalidTransfer};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid transfer: {0}")]
    Validation(#[from] InvalidTransfer),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Account {account_id} currency mismatch: {account_currency} vs {requested}")]
    CurrencyMismatch {
        account_id: AccountId,
        account_currency: String,
        requested: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Store(e) if e.is_not_found())
    }

    /// Whether the caller may repeat the same request unchanged. Nothing from
    /// the failed attempt was applied.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Store(e) if e.is_retryable())
    }
}
