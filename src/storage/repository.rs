use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{
    Account, AccountId, Cents, Entry, EntryId, NewAccount, NewUser, Transfer, TransferId,
    TransferParams, User,
};

use super::{MIGRATION_001_INITIAL, StoreConfig, StoreError, queries};

/// Row-level access to accounts, entries and transfers.
///
/// Implemented identically by [`Repository`], which runs each call on its own
/// pooled connection, and by [`TxRepository`](super::TxRepository), which runs
/// every call inside one open transaction.
#[async_trait]
pub trait LedgerStore: Send {
    async fn create_user(&mut self, params: &NewUser) -> Result<User, StoreError>;

    async fn get_user(&mut self, username: &str) -> Result<User, StoreError>;

    async fn create_account(&mut self, params: &NewAccount) -> Result<Account, StoreError>;

    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError>;

    async fn list_accounts(
        &mut self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, StoreError>;

    /// Atomic server-side `balance = balance + delta`.
    async fn add_balance(&mut self, id: AccountId, delta: Cents) -> Result<Account, StoreError>;

    async fn delete_account(&mut self, id: AccountId) -> Result<(), StoreError>;

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<Entry, StoreError>;

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry, StoreError>;

    async fn list_entries(
        &mut self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>, StoreError>;

    async fn create_transfer(&mut self, params: &TransferParams) -> Result<Transfer, StoreError>;

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, StoreError>;

    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, StoreError>;
}

/// Pool-backed store handle. Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool with the given settings.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::new(config.connect().await?))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self, StoreError> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn create_user(&mut self, params: &NewUser) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::create_user(&mut conn, params).await
    }

    async fn get_user(&mut self, username: &str) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::get_user(&mut conn, username).await
    }

    async fn create_account(&mut self, params: &NewAccount) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::create_account(&mut conn, params).await
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::get_account(&mut conn, id).await
    }

    async fn list_accounts(
        &mut self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::list_accounts(&mut conn, owner, limit, offset).await
    }

    async fn add_balance(&mut self, id: AccountId, delta: Cents) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::add_balance(&mut conn, id, delta).await
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::delete_account(&mut conn, id).await
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<Entry, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::create_entry(&mut conn, account_id, amount).await
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::get_entry(&mut conn, id).await
    }

    async fn list_entries(
        &mut self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::list_entries(&mut conn, account_id, limit, offset).await
    }

    async fn create_transfer(&mut self, params: &TransferParams) -> Result<Transfer, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::create_transfer(&mut conn, params).await
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::get_transfer(&mut conn, id).await
    }

    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queries::list_transfers(&mut conn, from_account_id, to_account_id, limit, offset).await
    }
}
