mod common;

use anyhow::Result;
use common::{AccountPair, balance_of, count_rows, test_service};
use ledgerbank::application::{AppError, Page};
use ledgerbank::storage::{StoreError, TxContext};

#[tokio::test]
async fn test_open_account_normalizes_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let account = service.open_account("carol", " usd ", 1_500).await?;
    assert_eq!(account.currency, "USD");
    assert_eq!(account.balance, 1_500);

    let err = service.open_account("carol", "GBP", 0).await.unwrap_err();
    assert!(matches!(err, AppError::UnsupportedCurrency(ref code) if code == "GBP"));
    assert_eq!(count_rows(&service, "accounts").await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_transfer_happy_path() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open_in(&service, "USD", 10_000).await?;

    let result = service
        .transfer(&TxContext::new(), alice.id, bob.id, 1_234, "usd")
        .await?;

    assert_eq!(result.from_account.balance, 8_766);
    assert_eq!(result.to_account.balance, 11_234);

    let transfers = service
        .list_transfers(alice.id, alice.id, Page::default())
        .await?;
    assert_eq!(transfers, vec![result.transfer]);

    let entries = service.list_entries(bob.id, Page::default()).await?;
    assert_eq!(entries, vec![result.to_entry]);

    Ok(())
}

#[tokio::test]
async fn test_transfer_requires_matching_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, _) = AccountPair::open_in(&service, "EUR", 10_000).await?;
    let dollars = service.open_account("dave", "USD", 10_000).await?;

    let err = service
        .transfer(&TxContext::new(), alice.id, dollars.id, 100, "EUR")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::CurrencyMismatch { account_id, ref account_currency, .. }
            if account_id == dollars.id && account_currency == "USD"
    ));

    assert_eq!(balance_of(&service, &alice).await?, 10_000);
    assert_eq!(count_rows(&service, "transfers").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_transfer_rejects_non_transferable_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open_in(&service, "CAD", 10_000).await?;

    let err = service
        .transfer(&TxContext::new(), alice.id, bob.id, 100, "CAD")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnsupportedCurrency(_)));
    assert_eq!(count_rows(&service, "transfers").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_transfer_to_missing_account_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 10_000).await?;

    let err = service
        .transfer(&TxContext::new(), alice.id, bob.id + 100, 100, "EUR")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(balance_of(&service, &alice).await?, 10_000);

    Ok(())
}

#[tokio::test]
async fn test_close_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 0).await?;

    service.close_account(bob.id).await?;
    let remaining = service.list_accounts("bob", Page::default()).await?;
    assert!(remaining.is_empty());
    assert_eq!(service.list_accounts("alice", Page::default()).await?, vec![alice]);

    Ok(())
}

#[tokio::test]
async fn test_open_account_requires_registered_owner() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service.open_account("nobody", "USD", 0).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Store(StoreError::NotFound { entity: "user", ref key }) if key == "nobody"
    ));
    assert_eq!(count_rows(&service, "accounts").await?, 0);

    let user = service
        .register_user("erin", "Erin Hale", "erin@example.com")
        .await?;
    assert_eq!(service.get_user("erin").await?, user);
    let account = service.open_account("erin", "USD", 0).await?;
    assert_eq!(account.owner, "erin");

    Ok(())
}
