use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account holder. Accounts reference their owner by `username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for registering a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            full_name: full_name.into(),
            email: email.into(),
        }
    }
}
