use crate::domain::{
    Account, AccountId, Cents, Currency, Entry, EntryId, NewAccount, NewUser, Transfer,
    TransferId, TransferParams, TransferResult, User,
};
use crate::storage::{LedgerStore, Repository, StoreConfig, TxContext, TxRunner};

use super::{AppError, TransferEngine};

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, etc.).
#[derive(Debug, Clone)]
pub struct LedgerService {
    repo: Repository,
    engine: TransferEngine,
}

/// Page of results for list operations
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl LedgerService {
    /// Create a new ledger service over the given repository. Transfers run on
    /// transactions drawn from the repository's pool.
    pub fn new(repo: Repository) -> Self {
        let engine = TransferEngine::new(TxRunner::new(repo.pool().clone()));
        Self { repo, engine }
    }

    /// Initialize a new database with the given settings.
    pub async fn init(config: &StoreConfig) -> Result<Self, AppError> {
        let config = config.clone().with_create_if_missing(true);
        let repo = Repository::init(&config).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &StoreConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(config).await?;
        Ok(Self::new(repo))
    }

    /// A plain (non-transactional) store handle on the service's pool.
    pub fn repository(&self) -> Repository {
        self.repo.clone()
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    // ========================
    // User operations
    // ========================

    /// Register an account holder. Usernames and emails are unique.
    pub async fn register_user(
        &self,
        username: &str,
        full_name: &str,
        email: &str,
    ) -> Result<User, AppError> {
        let params = NewUser::new(username, full_name, email);
        Ok(self.repository().create_user(&params).await?)
    }

    pub async fn get_user(&self, username: &str) -> Result<User, AppError> {
        Ok(self.repository().get_user(username).await?)
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account for a registered user in a supported currency.
    pub async fn open_account(
        &self,
        owner: &str,
        currency: &str,
        opening_balance: Cents,
    ) -> Result<Account, AppError> {
        let currency = Currency::from_str(currency)
            .ok_or_else(|| AppError::UnsupportedCurrency(currency.to_string()))?;
        self.get_user(owner).await?;
        let params = NewAccount::new(owner, currency.as_str()).with_balance(opening_balance);
        Ok(self.repository().create_account(&params).await?)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        Ok(self.repository().get_account(id).await?)
    }

    pub async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, AppError> {
        Ok(self
            .repository()
            .list_accounts(owner, page.limit, page.offset)
            .await?)
    }

    /// Delete an account that has never taken part in a transfer.
    pub async fn close_account(&self, id: AccountId) -> Result<(), AppError> {
        Ok(self.repository().delete_account(id).await?)
    }

    // ========================
    // Transfer operations
    // ========================

    /// Transfer between two accounts after checking that both exist and are
    /// held in the requested currency.
    pub async fn transfer(
        &self,
        ctx: &TxContext,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Cents,
        currency: &str,
    ) -> Result<TransferResult, AppError> {
        let requested = Currency::from_str(currency)
            .filter(Currency::is_transferable)
            .ok_or_else(|| AppError::UnsupportedCurrency(currency.to_string()))?;

        let params = TransferParams::new(from_account_id, to_account_id, amount);
        params.validate()?;

        self.ensure_currency(from_account_id, requested).await?;
        self.ensure_currency(to_account_id, requested).await?;

        self.engine.transfer_tx(ctx, params).await
    }

    /// Run the transfer transaction directly, without currency checks.
    pub async fn transfer_tx(
        &self,
        ctx: &TxContext,
        params: TransferParams,
    ) -> Result<TransferResult, AppError> {
        self.engine.transfer_tx(ctx, params).await
    }

    async fn ensure_currency(&self, id: AccountId, requested: Currency) -> Result<(), AppError> {
        let account = self.get_account(id).await?;
        if account.currency != requested.as_str() {
            return Err(AppError::CurrencyMismatch {
                account_id: id,
                account_currency: account.currency,
                requested: requested.to_string(),
            });
        }
        Ok(())
    }

    pub async fn get_transfer(&self, id: TransferId) -> Result<Transfer, AppError> {
        Ok(self.repository().get_transfer(id).await?)
    }

    /// Transfers leaving `from_account_id` or arriving at `to_account_id`.
    pub async fn list_transfers(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, AppError> {
        Ok(self
            .repository()
            .list_transfers(from_account_id, to_account_id, page.limit, page.offset)
            .await?)
    }

    // ========================
    // Entry operations
    // ========================

    pub async fn get_entry(&self, id: EntryId) -> Result<Entry, AppError> {
        Ok(self.repository().get_entry(id).await?)
    }

    pub async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, AppError> {
        Ok(self
            .repository()
            .list_entries(account_id, page.limit, page.offset)
            .await?)
    }
}
