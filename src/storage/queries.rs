//! Row-level SQL shared by the plain and the transactional store handles.
//! Every function runs on whatever connection it is given, so the caller
//! decides whether it executes inside a transaction.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::domain::{
    Account, AccountId, Cents, Entry, EntryId, NewAccount, NewUser, Transfer, TransferId,
    TransferParams, User,
};

use super::StoreError;

const USER_COLUMNS: &str = "username, full_name, email, created_at";
const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";

// ========================
// Users
// ========================

pub(crate) async fn create_user(
    conn: &mut SqliteConnection,
    params: &NewUser,
) -> Result<User, StoreError> {
    let row = sqlx::query(&format!(
        "INSERT INTO users (username, full_name, email, created_at) VALUES (?, ?, ?, ?) RETURNING {USER_COLUMNS}"
    ))
    .bind(&params.username)
    .bind(&params.full_name)
    .bind(&params.email)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;

    row_to_user(&row)
}

pub(crate) async fn get_user(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<User, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row_to_user(&row),
        None => Err(StoreError::not_found("user", username)),
    }
}

// ========================
// Accounts
// ========================

pub(crate) async fn create_account(
    conn: &mut SqliteConnection,
    params: &NewAccount,
) -> Result<Account, StoreError> {
    let row = sqlx::query(&format!(
        "INSERT INTO accounts (owner, balance, currency, created_at) VALUES (?, ?, ?, ?) RETURNING {ACCOUNT_COLUMNS}"
    ))
    .bind(&params.owner)
    .bind(params.balance)
    .bind(&params.currency)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;

    row_to_account(&row)
}

pub(crate) async fn get_account(
    conn: &mut SqliteConnection,
    id: AccountId,
) -> Result<Account, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row_to_account(&row),
        None => Err(StoreError::not_found("account", id)),
    }
}

pub(crate) async fn list_accounts(
    conn: &mut SqliteConnection,
    owner: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Account>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner = ? ORDER BY id LIMIT ? OFFSET ?"
    ))
    .bind(owner)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_account).collect()
}

/// Atomically add `delta` to an account's balance and return the updated row.
/// The increment is evaluated by the database inside a single statement, so
/// concurrent callers never overwrite each other's changes.
pub(crate) async fn add_balance(
    conn: &mut SqliteConnection,
    id: AccountId,
    delta: Cents,
) -> Result<Account, StoreError> {
    let row = sqlx::query(&format!(
        "UPDATE accounts SET balance = balance + ? WHERE id = ? RETURNING {ACCOUNT_COLUMNS}"
    ))
    .bind(delta)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row_to_account(&row),
        None => Err(StoreError::not_found("account", id)),
    }
}

pub(crate) async fn delete_account(
    conn: &mut SqliteConnection,
    id: AccountId,
) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("account", id));
    }
    Ok(())
}

// ========================
// Entries
// ========================

pub(crate) async fn create_entry(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    amount: Cents,
) -> Result<Entry, StoreError> {
    let row = sqlx::query(&format!(
        "INSERT INTO entries (account_id, amount, created_at) VALUES (?, ?, ?) RETURNING {ENTRY_COLUMNS}"
    ))
    .bind(account_id)
    .bind(amount)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;

    row_to_entry(&row)
}

pub(crate) async fn get_entry(
    conn: &mut SqliteConnection,
    id: EntryId,
) -> Result<Entry, StoreError> {
    let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => row_to_entry(&row),
        None => Err(StoreError::not_found("entry", id)),
    }
}

pub(crate) async fn list_entries(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Entry>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE account_id = ? ORDER BY id LIMIT ? OFFSET ?"
    ))
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_entry).collect()
}

// ========================
// Transfers
// ========================

pub(crate) async fn create_transfer(
    conn: &mut SqliteConnection,
    params: &TransferParams,
) -> Result<Transfer, StoreError> {
    let row = sqlx::query(&format!(
        "INSERT INTO transfers (from_account_id, to_account_id, amount, created_at) VALUES (?, ?, ?, ?) RETURNING {TRANSFER_COLUMNS}"
    ))
    .bind(params.from_account_id)
    .bind(params.to_account_id)
    .bind(params.amount)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;

    row_to_transfer(&row)
}

pub(crate) async fn get_transfer(
    conn: &mut SqliteConnection,
    id: TransferId,
) -> Result<Transfer, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row_to_transfer(&row),
        None => Err(StoreError::not_found("transfer", id)),
    }
}

/// Transfers leaving `from_account_id` or arriving at `to_account_id`.
pub(crate) async fn list_transfers(
    conn: &mut SqliteConnection,
    from_account_id: AccountId,
    to_account_id: AccountId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transfer>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE from_account_id = ? OR to_account_id = ? ORDER BY id LIMIT ? OFFSET ?"
    ))
    .bind(from_account_id)
    .bind(to_account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_transfer).collect()
}

// ========================
// Row mapping
// ========================

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column} '{raw}': {e}")))
}

fn row_to_user(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        balance: row.try_get("balance")?,
        currency: row.try_get("currency")?,
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<Entry, StoreError> {
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_transfer(row: &SqliteRow) -> Result<Transfer, StoreError> {
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: parse_timestamp(row, "created_at")?,
    })
}
