mod common;

use std::time::Duration;

use anyhow::Result;
use common::{AccountPair, TEST_POOL_SIZE, balance_of, count_rows, test_service};
use ledgerbank::application::{AppError, Page};
use ledgerbank::domain::{InvalidTransfer, TransferParams, is_balanced};
use ledgerbank::storage::{StoreError, TxContext};

#[tokio::test]
async fn test_transfer_posts_offsetting_entries() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 10_000).await?;

    let result = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, bob.id, 2_500))
        .await?;

    assert_eq!(result.transfer.from_account_id, alice.id);
    assert_eq!(result.transfer.to_account_id, bob.id);
    assert_eq!(result.transfer.amount, 2_500);

    assert_eq!(result.from_entry.account_id, alice.id);
    assert_eq!(result.from_entry.amount, -2_500);
    assert_eq!(result.to_entry.account_id, bob.id);
    assert_eq!(result.to_entry.amount, 2_500);
    assert!(is_balanced(&[result.from_entry.amount, result.to_entry.amount]));

    assert_eq!(result.from_account.id, alice.id);
    assert_eq!(result.from_account.balance, 7_500);
    assert_eq!(result.to_account.id, bob.id);
    assert_eq!(result.to_account.balance, 12_500);

    Ok(())
}

#[tokio::test]
async fn test_transfer_toward_lower_id_maps_accounts_correctly() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 10_000).await?;
    assert!(alice.id < bob.id);

    // Destination has the lower id, so its balance is adjusted first.
    let result = service
        .transfer_tx(&TxContext::new(), TransferParams::new(bob.id, alice.id, 400))
        .await?;

    assert_eq!(result.from_account.id, bob.id);
    assert_eq!(result.from_account.balance, 9_600);
    assert_eq!(result.to_account.id, alice.id);
    assert_eq!(result.to_account.balance, 10_400);
    assert_eq!(result.from_entry.account_id, bob.id);
    assert_eq!(result.to_entry.account_id, alice.id);

    Ok(())
}

#[tokio::test]
async fn test_committed_rows_match_result() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;

    let result = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, bob.id, 1_000))
        .await?;

    assert_eq!(service.get_transfer(result.transfer.id).await?, result.transfer);
    assert_eq!(service.get_entry(result.from_entry.id).await?, result.from_entry);
    assert_eq!(service.get_entry(result.to_entry.id).await?, result.to_entry);
    assert_eq!(service.get_account(alice.id).await?, result.from_account);
    assert_eq!(service.get_account(bob.id).await?, result.to_account);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_lose_no_updates() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 100_000).await?;

    let n = TEST_POOL_SIZE as i64;
    let amount = 10;

    let mut handles = Vec::new();
    for _ in 0..n {
        let service = service.clone();
        let params = TransferParams::new(alice.id, bob.id, amount);
        handles.push(tokio::spawn(async move {
            service.transfer_tx(&TxContext::new(), params).await
        }));
    }

    let mut transfer_ids = Vec::new();
    for handle in handles {
        let result = handle.await??;
        assert_eq!(result.from_account.id, alice.id);
        assert_eq!(result.to_account.id, bob.id);
        assert_eq!(result.from_entry.amount, -amount);
        assert_eq!(result.to_entry.amount, amount);
        service.get_transfer(result.transfer.id).await?;
        service.get_entry(result.from_entry.id).await?;
        service.get_entry(result.to_entry.id).await?;
        transfer_ids.push(result.transfer.id);
    }

    transfer_ids.sort_unstable();
    transfer_ids.dedup();
    assert_eq!(transfer_ids.len() as i64, n);

    assert_eq!(balance_of(&service, &alice).await?, 100_000 - n * amount);
    assert_eq!(balance_of(&service, &bob).await?, 100_000 + n * amount);

    let mut amounts = Vec::new();
    for account in [&alice, &bob] {
        let entries = service.list_entries(account.id, Page::default()).await?;
        amounts.extend(entries.iter().map(|entry| entry.amount));
    }
    assert_eq!(amounts.len() as i64, 2 * n);
    assert!(is_balanced(&amounts));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 100_000).await?;

    let n = TEST_POOL_SIZE as i64;
    let amount = 10;

    let mut handles = Vec::new();
    for i in 0..n {
        let service = service.clone();
        let params = if i % 2 == 0 {
            TransferParams::new(alice.id, bob.id, amount)
        } else {
            TransferParams::new(bob.id, alice.id, amount)
        };
        handles.push(tokio::spawn(async move {
            service.transfer_tx(&TxContext::new(), params).await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    assert_eq!(balance_of(&service, &alice).await?, 100_000);
    assert_eq!(balance_of(&service, &bob).await?, 100_000);
    assert_eq!(count_rows(&service, "transfers").await?, n);
    assert_eq!(count_rows(&service, "entries").await?, 2 * n);

    Ok(())
}

#[tokio::test]
async fn test_missing_source_account_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;
    let missing = bob.id + 100;

    let err = service
        .transfer_tx(&TxContext::new(), TransferParams::new(missing, bob.id, 100))
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "unexpected error: {err}");
    assert!(matches!(
        err,
        AppError::Store(StoreError::NotFound { entity: "account", ref key })
            if *key == missing.to_string()
    ));
    assert_eq!(balance_of(&service, &alice).await?, 5_000);
    assert_eq!(balance_of(&service, &bob).await?, 5_000);
    assert_eq!(count_rows(&service, "transfers").await?, 0);
    assert_eq!(count_rows(&service, "entries").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_missing_destination_account_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;
    let missing = bob.id + 100;

    let err = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, missing, 100))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Store(StoreError::NotFound { entity: "account", ref key })
            if *key == missing.to_string()
    ));
    assert_eq!(balance_of(&service, &alice).await?, 5_000);
    assert_eq!(balance_of(&service, &bob).await?, 5_000);
    assert_eq!(count_rows(&service, "transfers").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_invalid_params_rejected_before_store() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;

    let err = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, alice.id, 100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Validation(InvalidTransfer::SameAccount(id)) if id == alice.id
    ));

    let err = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, bob.id, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Validation(InvalidTransfer::NonPositiveAmount(0))
    ));

    // Validation happens before any context check or store access.
    let cancelled = TxContext::new();
    cancelled.cancel();
    let err = service
        .transfer_tx(&cancelled, TransferParams::new(alice.id, bob.id, -5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(count_rows(&service, "transfers").await?, 0);
    assert_eq!(balance_of(&service, &alice).await?, 5_000);

    Ok(())
}

#[tokio::test]
async fn test_replayed_transfer_is_not_deduplicated() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;
    let params = TransferParams::new(alice.id, bob.id, 300);

    let first = service.transfer_tx(&TxContext::new(), params).await?;
    let second = service.transfer_tx(&TxContext::new(), params).await?;

    assert_ne!(first.transfer.id, second.transfer.id);
    assert_ne!(first.from_entry.id, second.from_entry.id);
    assert_eq!(second.from_account.balance, 4_400);
    assert_eq!(second.to_account.balance, 5_600);
    assert_eq!(count_rows(&service, "transfers").await?, 2);

    Ok(())
}

#[tokio::test]
async fn test_cancelled_transfer_leaves_no_trace() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;

    let ctx = TxContext::new();
    ctx.cancel();
    let err = service
        .transfer_tx(&ctx, TransferParams::new(alice.id, bob.id, 100))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Store(StoreError::Cancelled)));
    assert!(!err.is_retryable());
    assert_eq!(balance_of(&service, &alice).await?, 5_000);
    assert_eq!(balance_of(&service, &bob).await?, 5_000);
    assert_eq!(count_rows(&service, "transfers").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_transfer_past_deadline_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;

    let ctx = TxContext::new().with_deadline(tokio::time::Instant::now());
    let err = service
        .transfer_tx(&ctx, TransferParams::new(alice.id, bob.id, 100))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Store(StoreError::DeadlineExceeded)));
    assert_eq!(count_rows(&service, "entries").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_balance_may_go_negative() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 100).await?;

    let result = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, bob.id, 250))
        .await?;

    assert_eq!(result.from_account.balance, -150);
    assert_eq!(result.to_account.balance, 350);

    Ok(())
}

#[tokio::test]
async fn test_deadline_while_waiting_for_lock_returns_promptly() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 5_000).await?;
    let repo = service.repository();

    // Another writer holds the database write lock.
    let mut writer = repo.pool().begin().await?;
    sqlx::query("UPDATE accounts SET balance = balance WHERE id = ?")
        .bind(alice.id)
        .execute(&mut *writer)
        .await?;

    let ctx = TxContext::new().with_timeout(Duration::from_millis(200));
    let started = std::time::Instant::now();
    let err = service
        .transfer_tx(&ctx, TransferParams::new(alice.id, bob.id, 100))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, AppError::Store(StoreError::DeadlineExceeded)));
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");

    writer.rollback().await?;
    assert_eq!(count_rows(&service, "transfers").await?, 0);
    assert_eq!(count_rows(&service, "entries").await?, 0);

    let result = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, bob.id, 100))
        .await?;
    assert_eq!(result.from_account.balance, 4_900);
    assert_eq!(result.to_account.balance, 5_100);

    Ok(())
}

#[tokio::test]
async fn test_balance_overflow_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = AccountPair::open(&service, 1_000).await?;

    let err = service
        .transfer_tx(&TxContext::new(), TransferParams::new(alice.id, bob.id, i64::MAX))
        .await
        .unwrap_err();

    assert!(
        matches!(err, AppError::Store(StoreError::ConstraintViolation(_))),
        "unexpected error: {err}"
    );
    assert_eq!(balance_of(&service, &alice).await?, 1_000);
    assert_eq!(balance_of(&service, &bob).await?, 1_000);
    assert_eq!(count_rows(&service, "transfers").await?, 0);

    Ok(())
}
