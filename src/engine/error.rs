use thiserror::Error;

use crate::domain::{AccountId, Cents};

/// Errors surfaced by the transfer engine and the ledger store adapters.
///
/// Adapters translate driver errors into these kinds before they reach the
/// orchestrator, which never looks at driver-specific detail.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Ledger conflict: {0}")]
    Conflict(String),

    #[error("Transaction failed ({error}) and rollback failed ({rollback})")]
    TransactionFailure {
        error: Box<LedgerError>,
        rollback: Box<LedgerError>,
    },

    #[error("Store failure: {0:#}")]
    StoreFailure(#[from] anyhow::Error),

    #[error("Transfer amount must be positive, got {0}")]
    InvalidAmount(Cents),

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),

    #[error("Account {0} is not locked by this transaction")]
    AccountNotLocked(AccountId),

    #[error("Transaction deadline exceeded")]
    DeadlineExceeded,
}

impl LedgerError {
    pub fn account_not_found(id: AccountId) -> Self {
        LedgerError::NotFound {
            entity: "Account",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
