//! In-memory ledger store with real per-account row locks.
//!
//! Every account sits behind its own async mutex. A transaction keeps the
//! owned guard of each account it locked until it commits or rolls back, so
//! transfers over disjoint accounts never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{Account, AccountId, Cents, Entry, NewAccount, Transfer};
use crate::engine::{LedgerError, LedgerResult, LedgerStore, LedgerTx};

#[derive(Default)]
struct Shared {
    accounts: Mutex<HashMap<AccountId, Arc<Mutex<Account>>>>,
    transfers: Mutex<Vec<Transfer>>,
    entries: Mutex<Vec<Entry>>,
    next_account_id: AtomicI64,
    next_transfer_id: AtomicI64,
    next_entry_id: AtomicI64,
}

impl Shared {
    async fn account_cell(&self, id: AccountId) -> Option<Arc<Mutex<Account>>> {
        self.accounts.lock().await.get(&id).cloned()
    }

    async fn account_exists(&self, id: AccountId) -> bool {
        self.accounts.lock().await.contains_key(&id)
    }
}

/// Cheaply cloneable handle to a shared in-memory ledger.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_account(&self, account: &NewAccount) -> LedgerResult<Account> {
        let id = self.shared.next_account_id.fetch_add(1, Ordering::SeqCst) + 1;
        let account = Account {
            id,
            owner: account.owner.clone(),
            currency: account.currency.clone(),
            balance: account.balance,
            created_at: Utc::now(),
        };

        self.shared
            .accounts
            .lock()
            .await
            .insert(id, Arc::new(Mutex::new(account.clone())));
        Ok(account)
    }

    /// Read an account. Waits while a transaction holds its lock.
    pub async fn get_account(&self, id: AccountId) -> LedgerResult<Account> {
        let cell = self
            .shared
            .account_cell(id)
            .await
            .ok_or_else(|| LedgerError::account_not_found(id))?;
        let account = cell.lock().await.clone();
        Ok(account)
    }

    pub async fn list_transfers(&self) -> Vec<Transfer> {
        self.shared.transfers.lock().await.clone()
    }

    /// Committed entries, optionally for a single account.
    pub async fn list_entries(&self, account_id: Option<AccountId>) -> Vec<Entry> {
        self.shared
            .entries
            .lock()
            .await
            .iter()
            .filter(|entry| account_id.is_none_or(|id| entry.account_id == id))
            .cloned()
            .collect()
    }

    pub async fn count_transfers(&self) -> usize {
        self.shared.transfers.lock().await.len()
    }

    pub async fn count_entries(&self) -> usize {
        self.shared.entries.lock().await.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> LedgerResult<MemoryTx> {
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            locked: HashMap::new(),
            balances: HashMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> LedgerResult<()> {
        let MemoryTx {
            shared,
            mut locked,
            balances,
            transfers,
            entries,
        } = tx;

        for (id, balance) in balances {
            if let Some(guard) = locked.get_mut(&id) {
                guard.balance = balance;
            }
        }
        shared.transfers.lock().await.extend(transfers);
        shared.entries.lock().await.extend(entries);

        // Row locks are released last, once everything is visible.
        drop(locked);
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> LedgerResult<()> {
        drop(tx);
        Ok(())
    }
}

/// An open in-memory transaction: buffered writes plus the row locks taken.
pub struct MemoryTx {
    shared: Arc<Shared>,
    locked: HashMap<AccountId, OwnedMutexGuard<Account>>,
    balances: HashMap<AccountId, Cents>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
}

impl MemoryTx {
    fn snapshot(&self, id: AccountId) -> Option<Account> {
        self.locked.get(&id).map(|guard| {
            let mut account = (**guard).clone();
            if let Some(balance) = self.balances.get(&id) {
                account.balance = *balance;
            }
            account
        })
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Cents,
    ) -> LedgerResult<Transfer> {
        for id in [from_account_id, to_account_id] {
            if !self.shared.account_exists(id).await {
                return Err(LedgerError::Conflict(format!(
                    "transfer references unknown account {}",
                    id
                )));
            }
        }

        let transfer = Transfer {
            id: self.shared.next_transfer_id.fetch_add(1, Ordering::SeqCst) + 1,
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_entry(&mut self, account_id: AccountId, amount: Cents) -> LedgerResult<Entry> {
        if !self.shared.account_exists(account_id).await {
            return Err(LedgerError::Conflict(format!(
                "entry references unknown account {}",
                account_id
            )));
        }

        let entry = Entry {
            id: self.shared.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1,
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_account_for_update(&mut self, account_id: AccountId) -> LedgerResult<Account> {
        if let Some(account) = self.snapshot(account_id) {
            return Ok(account);
        }

        let cell = self
            .shared
            .account_cell(account_id)
            .await
            .ok_or_else(|| LedgerError::account_not_found(account_id))?;
        let guard = cell.lock_owned().await;
        let account = (*guard).clone();
        self.locked.insert(account_id, guard);
        Ok(account)
    }

    async fn update_account_balance(
        &mut self,
        account_id: AccountId,
        balance: Cents,
    ) -> LedgerResult<Account> {
        if !self.locked.contains_key(&account_id) {
            return Err(LedgerError::AccountNotLocked(account_id));
        }
        self.balances.insert(account_id, balance);
        self.snapshot(account_id)
            .ok_or(LedgerError::AccountNotLocked(account_id))
    }
}
