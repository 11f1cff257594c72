mod common;

use anyhow::Result;
use common::test_service;
use simplebank::application::BankError;
use simplebank::engine::{LedgerError, TxContext};

#[tokio::test]
async fn test_create_and_get_account() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let account = service.create_account("alice", "USD", 10_000).await?;
    assert_eq!(account.owner, "alice");
    assert_eq!(account.currency, "USD");
    assert_eq!(account.balance, 10_000);

    let fetched = service.get_account(account.id).await?;
    assert_eq!(fetched.id, account.id);
    assert_eq!(fetched.balance, 10_000);

    Ok(())
}

#[tokio::test]
async fn test_one_account_per_owner_and_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service.create_account("alice", "USD", 0).await?;
    let err = service.create_account("alice", "USD", 0).await.unwrap_err();
    assert!(matches!(
        err,
        BankError::AccountAlreadyExists { ref owner, ref currency } if owner == "alice" && currency == "USD"
    ));

    // Another currency is fine
    service.create_account("alice", "EUR", 0).await?;

    Ok(())
}

#[tokio::test]
async fn test_create_account_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service.create_account("alice", "GBP", 0).await.unwrap_err();
    assert!(matches!(err, BankError::UnsupportedCurrency(ref c) if c == "GBP"));

    let err = service.create_account("   ", "USD", 0).await.unwrap_err();
    assert!(matches!(err, BankError::InvalidOwner(_)));

    let err = service.create_account("alice", "USD", -1).await.unwrap_err();
    assert!(matches!(err, BankError::InvalidAmount(-1)));

    assert!(service.list_accounts(None, 10, 0).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_get_missing_account_and_transfer() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service.get_account(42).await.unwrap_err();
    assert!(matches!(err, BankError::AccountNotFound(42)));

    let err = service.get_transfer(7).await.unwrap_err();
    assert!(matches!(err, BankError::TransferNotFound(7)));

    Ok(())
}

#[tokio::test]
async fn test_transfer_between_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = service.create_account("alice", "EUR", 10_000).await?;
    let bob = service.create_account("bob", "EUR", 0).await?;

    let result = service
        .create_transfer(&TxContext::named("pay bob"), alice.id, bob.id, 2_550, "EUR")
        .await?;

    assert_eq!(result.from_account.balance, 7_450);
    assert_eq!(result.to_account.balance, 2_550);
    assert_eq!(service.get_transfer(result.transfer.id).await?, result.transfer);
    assert_eq!(service.get_account(alice.id).await?.balance, 7_450);
    assert_eq!(service.get_account(bob.id).await?.balance, 2_550);

    Ok(())
}

#[tokio::test]
async fn test_transfer_currency_checks() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = service.create_account("alice", "EUR", 10_000).await?;
    let bob_usd = service.create_account("bob", "USD", 0).await?;
    let bob_eur = service.create_account("bob", "EUR", 0).await?;

    // Receiver in another currency
    let err = service
        .create_transfer(&TxContext::new(), alice.id, bob_usd.id, 100, "EUR")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BankError::CurrencyMismatch { account_id, ref actual, .. } if account_id == bob_usd.id && actual == "USD"
    ));

    // Requested currency differs from the sender's
    let err = service
        .create_transfer(&TxContext::new(), alice.id, bob_eur.id, 100, "USD")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BankError::CurrencyMismatch { account_id, .. } if account_id == alice.id
    ));

    assert_eq!(service.get_account(alice.id).await?.balance, 10_000);
    assert!(service.list_transfers(None, 10, 0).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_request_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = service.create_account("alice", "EUR", 10_000).await?;

    let err = service
        .create_transfer(&TxContext::new(), alice.id, 99, 100, "EUR")
        .await
        .unwrap_err();
    assert!(matches!(err, BankError::AccountNotFound(99)));

    let err = service
        .create_transfer(&TxContext::new(), alice.id, alice.id, 0, "EUR")
        .await
        .unwrap_err();
    assert!(matches!(err, BankError::InvalidAmount(0)));

    let err = service
        .create_transfer(&TxContext::new(), alice.id, alice.id, 100, "EUR")
        .await
        .unwrap_err();
    assert!(matches!(err, BankError::Ledger(LedgerError::SameAccount(id)) if id == alice.id));

    Ok(())
}

#[tokio::test]
async fn test_listing_and_pagination() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = service.create_account("alice", "EUR", 10_000).await?;
    let bob = service.create_account("bob", "EUR", 10_000).await?;
    let carol = service.create_account("carol", "EUR", 10_000).await?;
    service.create_account("alice", "CAD", 0).await?;

    for amount in 1..=5 {
        service
            .create_transfer(&TxContext::new(), alice.id, bob.id, amount, "EUR")
            .await?;
    }
    service
        .create_transfer(&TxContext::new(), bob.id, carol.id, 100, "EUR")
        .await?;

    // Entries of alice: five debits, oldest first
    let first = service.list_entries(alice.id, 3, 0).await?;
    let rest = service.list_entries(alice.id, 3, 3).await?;
    assert_eq!(first.len(), 3);
    assert_eq!(rest.len(), 2);
    let amounts: Vec<_> = first.iter().chain(&rest).map(|e| e.amount).collect();
    assert_eq!(amounts, vec![-1, -2, -3, -4, -5]);

    // Transfers touching bob, in either direction
    let bobs = service.list_transfers(Some(bob.id), 10, 0).await?;
    assert_eq!(bobs.len(), 6);
    let carols = service.list_transfers(Some(carol.id), 10, 0).await?;
    assert_eq!(carols.len(), 1);
    assert_eq!(carols[0].from_account_id, bob.id);
    assert_eq!(service.list_transfers(None, 4, 4).await?.len(), 2);

    let err = service.list_entries(99, 10, 0).await.unwrap_err();
    assert!(matches!(err, BankError::AccountNotFound(99)));
    let err = service.list_transfers(Some(99), 10, 0).await.unwrap_err();
    assert!(matches!(err, BankError::AccountNotFound(99)));

    // Accounts, optionally by owner
    assert_eq!(service.list_accounts(None, 10, 0).await?.len(), 4);
    let alices = service.list_accounts(Some("alice"), 10, 0).await?;
    assert_eq!(alices.len(), 2);
    assert!(alices.iter().all(|a| a.owner == "alice"));
    assert_eq!(service.list_accounts(None, 2, 3).await?.len(), 1);

    Ok(())
}
