use tracing::info;

use crate::domain::{
    Account, AccountId, Cents, Entry, NewAccount, Transfer, TransferId, TransferParams,
    TransferResult, is_supported_currency,
};
use crate::engine::{LedgerError, TxContext, transfer};
use crate::storage::{SqliteStore, StoreConfig};

use super::BankError;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Application service providing the bank's operations.
/// This is the primary interface for any client (CLI, API, etc.): it performs
/// the request validation the transfer engine leaves to its callers.
pub struct BankService {
    store: SqliteStore,
}

impl BankService {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Create (if needed) and migrate the database, then connect.
    pub async fn init(config: &StoreConfig) -> Result<Self, BankError> {
        let store = SqliteStore::init(config).await?;
        Ok(Self::new(store))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &StoreConfig) -> Result<Self, BankError> {
        let store = SqliteStore::connect(config).await?;
        Ok(Self::new(store))
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account. One account per owner and currency.
    pub async fn create_account(
        &self,
        owner: &str,
        currency: &str,
        opening_balance: Cents,
    ) -> Result<Account, BankError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(BankError::InvalidOwner(owner.to_string()));
        }
        if !is_supported_currency(currency) {
            return Err(BankError::UnsupportedCurrency(currency.to_string()));
        }
        if opening_balance < 0 {
            return Err(BankError::InvalidAmount(opening_balance));
        }

        let new_account = NewAccount::new(owner, currency).with_balance(opening_balance);
        match self.store.create_account(&new_account).await {
            Ok(account) => {
                info!(account_id = account.id, owner, currency, "account created");
                Ok(account)
            }
            Err(LedgerError::Conflict(_)) => Err(BankError::AccountAlreadyExists {
                owner: owner.to_string(),
                currency: currency.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, BankError> {
        self.store
            .get_account(id)
            .await?
            .ok_or(BankError::AccountNotFound(id))
    }

    pub async fn list_accounts(
        &self,
        owner: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, BankError> {
        Ok(self.store.list_accounts(owner, limit, offset).await?)
    }

    // ========================
    // Transfer operations
    // ========================

    /// Validate a transfer request and hand it to the transfer engine.
    ///
    /// Both accounts must exist and be held in `currency`.
    pub async fn create_transfer(
        &self,
        ctx: &TxContext,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Cents,
        currency: &str,
    ) -> Result<TransferResult, BankError> {
        if amount <= 0 {
            return Err(BankError::InvalidAmount(amount));
        }

        self.valid_account(from_account_id, currency).await?;
        self.valid_account(to_account_id, currency).await?;

        let params = TransferParams::new(from_account_id, to_account_id, amount);
        Ok(transfer(&self.store, ctx, params).await?)
    }

    async fn valid_account(&self, id: AccountId, currency: &str) -> Result<Account, BankError> {
        let account = self.get_account(id).await?;
        if account.currency != currency {
            return Err(BankError::CurrencyMismatch {
                account_id: id,
                actual: account.currency,
                requested: currency.to_string(),
            });
        }
        Ok(account)
    }

    pub async fn get_transfer(&self, id: TransferId) -> Result<Transfer, BankError> {
        self.store
            .get_transfer(id)
            .await?
            .ok_or(BankError::TransferNotFound(id))
    }

    /// List transfers, optionally only those touching one account.
    pub async fn list_transfers(
        &self,
        account_id: Option<AccountId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, BankError> {
        if let Some(id) = account_id {
            self.get_account(id).await?;
        }
        Ok(self.store.list_transfers(account_id, limit, offset).await?)
    }

    // ========================
    // Entry operations
    // ========================

    pub async fn list_entries(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>, BankError> {
        self.get_account(account_id).await?;
        Ok(self.store.list_entries(account_id, limit, offset).await?)
    }
}
