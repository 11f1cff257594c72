use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::warn;

use crate::domain::{
    Account, AccountId, Cents, Entry, EntryId, NewAccount, Transfer, TransferId,
};
use crate::engine::{LedgerError, LedgerResult, LedgerStore, LedgerTx};

use super::MIGRATION_001_INITIAL;

/// Connection settings for [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// sqlx SQLite url, e.g. `sqlite:bank.db`
    pub database_url: String,
    pub max_connections: u32,
    /// How long a writer waits for the database write lock
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Config for a database file path.
    pub fn for_path(path: &str) -> Self {
        Self::new(format!("sqlite:{}", path))
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:simplebank.db".to_string(),
            max_connections: 10,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: false,
        }
    }
}

/// SQLite-backed ledger store.
///
/// Each transaction runs on its own pooled connection opened with
/// `BEGIN IMMEDIATE`, which takes the database write lock up front. That lock
/// covers every row the transaction may lock for update.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a connection pool with the given settings.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("Invalid database url: {}", config.database_url))?
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Apply the schema. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Connect (creating the file if needed) and migrate.
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let store = Self::connect(&config.clone().with_create_if_missing(true)).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new account. A second account for the same owner and currency
    /// is a `Conflict`.
    pub async fn create_account(&self, account: &NewAccount) -> LedgerResult<Account> {
        let created_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (owner, currency, balance, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&account.owner)
        .bind(&account.currency)
        .bind(account.balance)
        .bind(created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error(e, "Failed to create account"))?;

        Ok(Account {
            id: row.get("id"),
            owner: account.owner.clone(),
            currency: account.currency.clone(),
            balance: account.balance,
            created_at,
        })
    }

    /// Plain (non-locking) read of an account.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, currency, balance, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// List accounts ordered by id, optionally for one owner.
    pub async fn list_accounts(
        &self,
        owner: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, currency, balance, created_at
            FROM accounts
            WHERE (? IS NULL OR owner = ?)
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(owner)
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    // ========================
    // Entry operations
    // ========================

    pub async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        let row = sqlx::query("SELECT id, account_id, amount, created_at FROM entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch entry")?;

        row.as_ref().map(row_to_entry).transpose()
    }

    /// Entries of one account, oldest first.
    pub async fn list_entries(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = ?
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list entries")?;

        rows.iter().map(row_to_entry).collect()
    }

    pub async fn count_entries(&self) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM entries")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count entries")?
            .get("count");
        Ok(count)
    }

    // ========================
    // Transfer operations
    // ========================

    pub async fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>> {
        let row = sqlx::query(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transfer")?;

        row.as_ref().map(row_to_transfer).transpose()
    }

    /// Transfers ordered by id, optionally those touching one account.
    pub async fn list_transfers(
        &self,
        account_id: Option<AccountId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>> {
        let rows = sqlx::query(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE (? IS NULL OR from_account_id = ? OR to_account_id = ?)
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(account_id)
        .bind(account_id)
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transfers")?;

        rows.iter().map(row_to_transfer).collect()
    }

    pub async fn count_transfers(&self) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM transfers")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transfers")?
            .get("count");
        Ok(count)
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    type Tx = SqliteTx;

    async fn begin(&self) -> LedgerResult<SqliteTx> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| store_error(e, "Failed to acquire connection"))?;

        // Owned by `tx` before BEGIN is sent, so a begin cancelled while
        // waiting for the write lock closes the connection rather than pooling it.
        let mut tx = SqliteTx {
            conn: Some(conn),
            locked: HashSet::new(),
        };

        let begun = sqlx::query("BEGIN IMMEDIATE").execute(tx.conn()?).await;
        if let Err(e) = begun {
            // No transaction is open, so the connection can be reused.
            drop(tx.take_conn());
            return Err(store_error(e, "Failed to begin transaction"));
        }

        Ok(tx)
    }

    async fn commit(&self, mut tx: SqliteTx) -> LedgerResult<()> {
        let mut conn = tx.take_conn()?;
        match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Closing the connection makes SQLite discard the transaction.
                drop(conn.detach());
                Err(store_error(e, "Failed to commit transaction"))
            }
        }
    }

    async fn rollback(&self, mut tx: SqliteTx) -> LedgerResult<()> {
        let mut conn = tx.take_conn()?;
        match sqlx::query("ROLLBACK").execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                drop(conn.detach());
                Err(store_error(e, "Failed to roll back transaction"))
            }
        }
    }
}

/// An open SQLite transaction.
///
/// Dropped without commit or rollback, it closes its connection instead of
/// returning it to the pool, so the open transaction dies with it.
pub struct SqliteTx {
    conn: Option<PoolConnection<Sqlite>>,
    locked: HashSet<AccountId>,
}

impl SqliteTx {
    fn conn(&mut self) -> LedgerResult<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| LedgerError::StoreFailure(anyhow::anyhow!("Transaction already finished")))
    }

    fn take_conn(&mut self) -> LedgerResult<PoolConnection<Sqlite>> {
        self.conn
            .take()
            .ok_or_else(|| LedgerError::StoreFailure(anyhow::anyhow!("Transaction already finished")))
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("sqlite transaction dropped while open, closing its connection");
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl LedgerTx for SqliteTx {
    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Cents,
    ) -> LedgerResult<Transfer> {
        let created_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .bind(created_at.to_rfc3339())
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| store_error(e, "Failed to create transfer"))?;

        Ok(Transfer {
            id: row.get("id"),
            from_account_id,
            to_account_id,
            amount,
            created_at,
        })
    }

    async fn create_entry(&mut self, account_id: AccountId, amount: Cents) -> LedgerResult<Entry> {
        let created_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO entries (account_id, amount, created_at)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .bind(created_at.to_rfc3339())
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| store_error(e, "Failed to create entry"))?;

        Ok(Entry {
            id: row.get("id"),
            account_id,
            amount,
            created_at,
        })
    }

    async fn get_account_for_update(&mut self, account_id: AccountId) -> LedgerResult<Account> {
        // The write lock is already held since BEGIN IMMEDIATE; record the row
        // so balance updates can be checked against it.
        let row = sqlx::query(
            r#"
            SELECT id, owner, currency, balance, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| store_error(e, "Failed to lock account"))?
        .ok_or_else(|| LedgerError::account_not_found(account_id))?;

        let account = row_to_account(&row)?;
        self.locked.insert(account_id);
        Ok(account)
    }

    async fn update_account_balance(
        &mut self,
        account_id: AccountId,
        balance: Cents,
    ) -> LedgerResult<Account> {
        if !self.locked.contains(&account_id) {
            return Err(LedgerError::AccountNotLocked(account_id));
        }

        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = ?
            WHERE id = ?
            RETURNING id, owner, currency, balance, created_at
            "#,
        )
        .bind(balance)
        .bind(account_id)
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| store_error(e, "Failed to update account balance"))?
        .ok_or_else(|| LedgerError::account_not_found(account_id))?;

        Ok(row_to_account(&row)?)
    }
}

/// Translate a sqlx error into a ledger error kind.
fn store_error(err: sqlx::Error, action: &'static str) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(
            db_err.kind(),
            ErrorKind::UniqueViolation | ErrorKind::ForeignKeyViolation | ErrorKind::CheckViolation
        ) {
            return LedgerError::Conflict(format!("{}: {}", action, db_err.message()));
        }
    }
    LedgerError::StoreFailure(anyhow::Error::new(err).context(action))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        currency: row.try_get("currency")?,
        balance: row.try_get("balance")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<Entry> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_transfer(row: &SqliteRow) -> Result<Transfer> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::for_path("/tmp/bank.db");
        assert_eq!(config.database_url, "sqlite:/tmp/bank.db");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert!(!config.create_if_missing);
    }

    #[test]
    fn test_row_not_found_is_store_failure() {
        let err = store_error(sqlx::Error::RowNotFound, "Failed to fetch");
        assert!(matches!(err, LedgerError::StoreFailure(_)));
    }
}
