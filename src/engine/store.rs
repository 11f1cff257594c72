//! Ledger store abstraction used by the transfer engine.
//!
//! A store hands out transactions; a transaction exposes exactly the four
//! ledger operations a transfer needs. Committing and rolling back go
//! through the store so a unit of work can never finish (or nest) its own
//! transaction.

use async_trait::async_trait;

use crate::domain::{Account, AccountId, Cents, Entry, Transfer};

use super::LedgerResult;

/// Operations available inside an open transaction.
#[async_trait]
pub trait LedgerTx: Send {
    /// Insert a transfer record. Referential failures map to `Conflict`.
    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Cents,
    ) -> LedgerResult<Transfer>;

    /// Insert a ledger entry. Referential failures map to `Conflict`.
    async fn create_entry(&mut self, account_id: AccountId, amount: Cents) -> LedgerResult<Entry>;

    /// Read an account and take its exclusive lock, held until the
    /// transaction commits or rolls back. Missing accounts map to `NotFound`.
    async fn get_account_for_update(&mut self, account_id: AccountId) -> LedgerResult<Account>;

    /// Overwrite the balance of an account this transaction has locked.
    async fn update_account_balance(
        &mut self,
        account_id: AccountId,
        balance: Cents,
    ) -> LedgerResult<Account>;
}

/// A transactional ledger backend.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    async fn begin(&self) -> LedgerResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> LedgerResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> LedgerResult<()>;
}
