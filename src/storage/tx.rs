use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    Account, AccountId, Cents, Entry, EntryId, NewAccount, NewUser, Transfer, TransferId,
    TransferParams, User,
};

use super::{LedgerStore, StoreError, queries};

/// Cancellation and deadline carried by one store operation.
///
/// Cloning shares the cancellation token, so cancelling any clone cancels
/// every operation running under it.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl TxContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fails if the context was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StoreError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn interrupted(&self) -> StoreError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => StoreError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => StoreError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                StoreError::Cancelled
            }
        }
    }
}

/// Store handle whose every read and write runs inside one open transaction.
///
/// Only [`TxRunner`] creates these, and it always ends the transaction with
/// exactly one commit or rollback.
pub struct TxRepository {
    tx: Transaction<'static, Sqlite>,
}

impl TxRepository {
    /// The transaction's connection, for statements outside [`LedgerStore`].
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self) {
        if let Err(e) = self.tx.rollback().await {
            tracing::warn!(error = %e, "transaction rollback failed");
        } else {
            tracing::debug!("transaction rolled back");
        }
    }
}

#[async_trait]
impl LedgerStore for TxRepository {
    async fn create_user(&mut self, params: &NewUser) -> Result<User, StoreError> {
        queries::create_user(&mut self.tx, params).await
    }

    async fn get_user(&mut self, username: &str) -> Result<User, StoreError> {
        queries::get_user(&mut self.tx, username).await
    }

    async fn create_account(&mut self, params: &NewAccount) -> Result<Account, StoreError> {
        queries::create_account(&mut self.tx, params).await
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        queries::get_account(&mut self.tx, id).await
    }

    async fn list_accounts(
        &mut self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, StoreError> {
        queries::list_accounts(&mut self.tx, owner, limit, offset).await
    }

    async fn add_balance(&mut self, id: AccountId, delta: Cents) -> Result<Account, StoreError> {
        queries::add_balance(&mut self.tx, id, delta).await
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<(), StoreError> {
        queries::delete_account(&mut self.tx, id).await
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<Entry, StoreError> {
        queries::create_entry(&mut self.tx, account_id, amount).await
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry, StoreError> {
        queries::get_entry(&mut self.tx, id).await
    }

    async fn list_entries(
        &mut self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>, StoreError> {
        queries::list_entries(&mut self.tx, account_id, limit, offset).await
    }

    async fn create_transfer(&mut self, params: &TransferParams) -> Result<Transfer, StoreError> {
        queries::create_transfer(&mut self.tx, params).await
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, StoreError> {
        queries::get_transfer(&mut self.tx, id).await
    }

    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, StoreError> {
        queries::list_transfers(&mut self.tx, from_account_id, to_account_id, limit, offset).await
    }
}

enum Outcome<T, E> {
    Finished(Result<T, E>),
    Interrupted(StoreError),
    Panicked(Box<dyn Any + Send>),
}

/// Runs units of work inside database transactions drawn from one pool.
///
/// The runner holds no state besides the pool handle and can be shared by any
/// number of concurrent callers. It never retries.
#[derive(Debug, Clone)]
pub struct TxRunner {
    pool: SqlitePool,
}

impl TxRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Begin a transaction, run `work` once against it, then commit if `work`
    /// succeeded or roll back if it failed, panicked or `ctx` fired first.
    ///
    /// Errors from `work` are returned unchanged. A failed commit surfaces as
    /// [`StoreError::Commit`] and nothing is applied. Cancellation is checked
    /// once more right before committing.
    ///
    /// When `ctx` fires mid-transaction the call returns at once, even if a
    /// statement is still blocked on a lock; the rollback is applied on the
    /// connection before it is reused.
    pub async fn run_in_transaction<T, E, F>(&self, ctx: &TxContext, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: for<'t> FnOnce(&'t mut TxRepository) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        ctx.check()?;

        let tx = tokio::select! {
            biased;
            reason = ctx.interrupted() => return Err(reason.into()),
            tx = self.pool.begin() => tx.map_err(StoreError::from)?,
        };
        tracing::debug!("transaction started");

        let mut repo = TxRepository { tx };
        let outcome = {
            let work = AssertUnwindSafe(work(&mut repo)).catch_unwind();
            tokio::select! {
                biased;
                reason = ctx.interrupted() => Outcome::Interrupted(reason),
                result = work => match result {
                    Ok(result) => Outcome::Finished(result),
                    Err(payload) => Outcome::Panicked(payload),
                },
            }
        };

        match outcome {
            Outcome::Finished(Ok(value)) => {
                if let Err(reason) = ctx.check() {
                    repo.rollback().await;
                    return Err(reason.into());
                }
                if let Err(e) = repo.commit().await {
                    tracing::warn!(error = %e, "transaction commit failed");
                    return Err(StoreError::Commit(e).into());
                }
                tracing::debug!("transaction committed");
                Ok(value)
            }
            Outcome::Finished(Err(err)) => {
                repo.rollback().await;
                Err(err)
            }
            Outcome::Interrupted(reason) => {
                // The last statement may still be waiting on another writer's
                // lock. Dropping the transaction queues its rollback on the
                // connection without waiting for that statement to give up.
                tracing::debug!(reason = %reason, "transaction interrupted, rollback queued");
                drop(repo);
                Err(reason.into())
            }
            Outcome::Panicked(payload) => {
                tracing::warn!("unit of work panicked, rolling back");
                repo.rollback().await;
                std::panic::resume_unwind(payload)
            }
        }
    }
}
