use thiserror::Error;

use crate::domain::{AccountId, Cents};
use crate::engine::LedgerError;

#[derive(Error, Debug)]
pub enum BankError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Transfer not found: {0}")]
    TransferNotFound(i64),

    #[error("Account already exists for owner {owner} in {currency}")]
    AccountAlreadyExists { owner: String, currency: String },

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Account {account_id} currency mismatch: {actual} vs {requested}")]
    CurrencyMismatch {
        account_id: AccountId,
        actual: String,
        requested: String,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Cents),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
