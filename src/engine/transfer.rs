use tracing::{Instrument, debug, info, info_span};

use crate::domain::{Account, AccountId, Cents, TransferParams, TransferResult};

use super::{LedgerError, LedgerResult, LedgerStore, LedgerTx, TxContext, exec_tx, lock_order};

/// Move `params.amount` from one account to another as one atomic unit.
///
/// Writes the transfer record, a debit and a credit entry, and both new
/// balances in a single transaction. Balances are locked in [`lock_order`],
/// so concurrent transfers over the same pair (in either direction) cannot
/// deadlock. Nothing is retried: the first failure rolls everything back
/// and is returned as is.
///
/// Non-positive amounts and self-transfers are rejected before a
/// transaction is opened.
pub async fn transfer<S: LedgerStore>(
    store: &S,
    ctx: &TxContext,
    params: TransferParams,
) -> LedgerResult<TransferResult> {
    if params.amount <= 0 {
        return Err(LedgerError::InvalidAmount(params.amount));
    }
    if params.from_account_id == params.to_account_id {
        return Err(LedgerError::SameAccount(params.from_account_id));
    }

    let span = info_span!(
        "transfer",
        tx = %ctx.label(),
        from = params.from_account_id,
        to = params.to_account_id,
        amount = params.amount,
    );

    async move {
        let result = exec_tx::<S, TransferResult, _>(store, ctx, move |tx| {
            Box::pin(transfer_in_tx(tx, params))
        })
        .await?;
        info!(
            transfer_id = result.transfer.id,
            from_balance = result.from_account.balance,
            to_balance = result.to_account.balance,
            "transfer committed"
        );
        Ok(result)
    }
    .instrument(span)
    .await
}

async fn transfer_in_tx<T: LedgerTx>(tx: &mut T, params: TransferParams) -> LedgerResult<TransferResult> {
    let TransferParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    debug!("create transfer");
    let transfer = tx
        .create_transfer(from_account_id, to_account_id, amount)
        .await?;

    debug!("create entries");
    let from_entry = tx.create_entry(from_account_id, -amount).await?;
    let to_entry = tx.create_entry(to_account_id, amount).await?;

    let [first, second] = lock_order(from_account_id, to_account_id);
    let first_account = apply_delta(tx, first, params.delta_for(first)).await?;
    let second_account = apply_delta(tx, second, params.delta_for(second)).await?;

    let (from_account, to_account) = if first == from_account_id {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Lock `account_id`, then write back its balance shifted by `delta`.
async fn apply_delta<T: LedgerTx>(
    tx: &mut T,
    account_id: AccountId,
    delta: Cents,
) -> LedgerResult<Account> {
    debug!(account = account_id, "lock account");
    let account = tx.get_account_for_update(account_id).await?;

    let balance = account
        .balance
        .checked_add(delta)
        .ok_or(LedgerError::BalanceOverflow(account_id))?;

    debug!(account = account_id, balance, "update balance");
    tx.update_account_balance(account_id, balance).await
}
