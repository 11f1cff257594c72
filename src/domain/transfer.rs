use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Account, AccountId, Cents, Entry};

pub type TransferId = i64;

/// A committed movement of money from one account to another.
/// Transfers are immutable; the amount is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    /// Source account (balance decreases)
    pub from_account_id: AccountId,
    /// Destination account (balance increases)
    pub to_account_id: AccountId,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

/// Input of a single transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Cents,
}

impl TransferParams {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Cents) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Signed balance change this transfer applies to `account_id`.
    pub fn delta_for(&self, account_id: AccountId) -> Cents {
        if account_id == self.from_account_id {
            -self.amount
        } else if account_id == self.to_account_id {
            self.amount
        } else {
            0
        }
    }
}

/// Everything one successful transfer wrote, as seen right after commit.
///
/// `from_account`/`to_account` follow the transfer direction, not the order
/// in which the accounts were locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_for_each_side() {
        let params = TransferParams::new(1, 2, 10);

        assert_eq!(params.delta_for(1), -10);
        assert_eq!(params.delta_for(2), 10);
        assert_eq!(params.delta_for(3), 0);
    }

    #[test]
    fn test_deltas_cancel_out() {
        let params = TransferParams::new(7, 3, 4_250);
        assert_eq!(params.delta_for(7) + params.delta_for(3), 0);
    }
}
