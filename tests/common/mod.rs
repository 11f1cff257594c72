// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use simplebank::application::BankService;
use simplebank::domain::{Account, AccountId, Cents, Entry, NewAccount, Transfer};
use simplebank::engine::{LedgerError, LedgerResult, LedgerStore, LedgerTx};
use simplebank::storage::{MemoryStore, SqliteStore, StoreConfig};
use tempfile::TempDir;

/// Helper to create a migrated SQLite store in a temporary directory
pub async fn test_store() -> Result<(SqliteStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = StoreConfig::for_path(db_path.to_str().unwrap()).with_max_connections(8);
    let store = SqliteStore::init(&config).await?;
    Ok((store, temp_dir))
}

/// Helper to create a service over a temporary database
pub async fn test_service() -> Result<(BankService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = BankService::init(&StoreConfig::for_path(db_path.to_str().unwrap())).await?;
    Ok((service, temp_dir))
}

/// Open one EUR account per balance, each with its own owner.
pub async fn sqlite_accounts(store: &SqliteStore, balances: &[Cents]) -> Result<Vec<Account>> {
    let mut accounts = Vec::new();
    for (i, balance) in balances.iter().enumerate() {
        let new = NewAccount::new(format!("owner-{}", i), "EUR").with_balance(*balance);
        accounts.push(store.create_account(&new).await?);
    }
    Ok(accounts)
}

pub async fn memory_accounts(store: &MemoryStore, balances: &[Cents]) -> Result<Vec<Account>> {
    let mut accounts = Vec::new();
    for (i, balance) in balances.iter().enumerate() {
        let new = NewAccount::new(format!("owner-{}", i), "EUR").with_balance(*balance);
        accounts.push(store.create_account(&new).await?);
    }
    Ok(accounts)
}

/// Where a [`FaultyStore`] makes its transaction fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    CreateTransfer,
    /// n-th entry creation (1-based)
    CreateEntry(usize),
    /// n-th locked account read (1-based)
    LockAccount(usize),
    /// n-th balance update (1-based)
    UpdateBalance(usize),
    /// n-th locked account read reports the account as gone (1-based)
    MissingAccount(usize),
    Never,
}

/// Wraps a store and injects a failure at a chosen point of each transaction.
#[derive(Clone)]
pub struct FaultyStore<S> {
    pub inner: S,
    fail_at: FailPoint,
    fail_rollback: bool,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S, fail_at: FailPoint) -> Self {
        Self {
            inner,
            fail_at,
            fail_rollback: false,
        }
    }

    /// Also report the rollback as failed (after actually rolling back).
    pub fn with_failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }
}

fn injected(point: FailPoint) -> LedgerError {
    LedgerError::StoreFailure(anyhow::anyhow!("injected failure at {:?}", point))
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for FaultyStore<S> {
    type Tx = FaultyTx<S::Tx>;

    async fn begin(&self) -> LedgerResult<Self::Tx> {
        Ok(FaultyTx {
            inner: self.inner.begin().await?,
            fail_at: self.fail_at,
            entries: 0,
            locks: 0,
            updates: 0,
        })
    }

    async fn commit(&self, tx: Self::Tx) -> LedgerResult<()> {
        self.inner.commit(tx.inner).await
    }

    async fn rollback(&self, tx: Self::Tx) -> LedgerResult<()> {
        self.inner.rollback(tx.inner).await?;
        if self.fail_rollback {
            return Err(LedgerError::StoreFailure(anyhow::anyhow!(
                "injected rollback failure"
            )));
        }
        Ok(())
    }
}

pub struct FaultyTx<T> {
    inner: T,
    fail_at: FailPoint,
    entries: usize,
    locks: usize,
    updates: usize,
}

#[async_trait]
impl<T: LedgerTx> LedgerTx for FaultyTx<T> {
    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Cents,
    ) -> LedgerResult<Transfer> {
        if self.fail_at == FailPoint::CreateTransfer {
            return Err(injected(self.fail_at));
        }
        self.inner
            .create_transfer(from_account_id, to_account_id, amount)
            .await
    }

    async fn create_entry(&mut self, account_id: AccountId, amount: Cents) -> LedgerResult<Entry> {
        self.entries += 1;
        if self.fail_at == FailPoint::CreateEntry(self.entries) {
            return Err(injected(self.fail_at));
        }
        self.inner.create_entry(account_id, amount).await
    }

    async fn get_account_for_update(&mut self, account_id: AccountId) -> LedgerResult<Account> {
        self.locks += 1;
        if self.fail_at == FailPoint::LockAccount(self.locks) {
            return Err(injected(self.fail_at));
        }
        if self.fail_at == FailPoint::MissingAccount(self.locks) {
            return Err(LedgerError::account_not_found(account_id));
        }
        self.inner.get_account_for_update(account_id).await
    }

    async fn update_account_balance(
        &mut self,
        account_id: AccountId,
        balance: Cents,
    ) -> LedgerResult<Account> {
        self.updates += 1;
        if self.fail_at == FailPoint::UpdateBalance(self.updates) {
            return Err(injected(self.fail_at));
        }
        self.inner.update_account_balance(account_id, balance).await
    }
}
