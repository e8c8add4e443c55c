use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents};

pub type EntryId = i64;

/// One signed line against a single account. Negative amounts are debits,
/// positive amounts are credits. Entries are never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }

    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }
}
