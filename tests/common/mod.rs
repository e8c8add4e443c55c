// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use ledgerbank::application::LedgerService;
use ledgerbank::domain::{Account, Cents};
use ledgerbank::storage::StoreConfig;
use tempfile::TempDir;

/// Pool size used by test databases; concurrency tests run up to this many
/// transfers at once.
pub const TEST_POOL_SIZE: u32 = 10;

/// Users registered in every test database, so they can own accounts
pub const TEST_USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = StoreConfig::for_path(&db_path).with_max_connections(TEST_POOL_SIZE);
    let service = LedgerService::init(&config).await?;
    for username in TEST_USERS {
        service
            .register_user(username, &username.to_uppercase(), &format!("{username}@example.com"))
            .await?;
    }
    Ok((service, temp_dir))
}

/// Test fixture: two funded accounts in the same currency
pub struct AccountPair;

impl AccountPair {
    pub async fn open(service: &LedgerService, balance: Cents) -> Result<(Account, Account)> {
        Self::open_in(service, "EUR", balance).await
    }

    pub async fn open_in(
        service: &LedgerService,
        currency: &str,
        balance: Cents,
    ) -> Result<(Account, Account)> {
        let first = service.open_account("alice", currency, balance).await?;
        let second = service.open_account("bob", currency, balance).await?;
        Ok((first, second))
    }
}

/// Read an account's current balance outside any transaction
pub async fn balance_of(service: &LedgerService, account: &Account) -> Result<Cents> {
    Ok(service.get_account(account.id).await?.balance)
}

/// Count rows in a table, bypassing the store API
pub async fn count_rows(service: &LedgerService, table: &str) -> Result<i64> {
    let repo = service.repository();
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(repo.pool())
        .await?;
    Ok(count)
}
