use tracing::info;

use crate::domain::{TransferParams, TransferResult, lock_ordered_adjustments, posting_pair};
use crate::storage::{LedgerStore, StoreError, TxContext, TxRunner};

use super::AppError;

/// Executes money transfers as single atomic units of work.
///
/// Holds no state across calls: any number of transfers may run concurrently
/// through one engine, each in its own transaction.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    runner: TxRunner,
}

impl TransferEngine {
    pub fn new(runner: TxRunner) -> Self {
        Self { runner }
    }

    /// Move `params.amount` from one account to another.
    ///
    /// Inside one transaction this records the transfer, a debit entry on the
    /// source, a credit entry on the destination, and applies both balance
    /// changes. Either all of it commits or none of it does.
    ///
    /// Identical calls are not deduplicated: replaying a request produces a
    /// second, independent transfer.
    pub async fn transfer_tx(
        &self,
        ctx: &TxContext,
        params: TransferParams,
    ) -> Result<TransferResult, AppError> {
        params.validate()?;

        let result = self
            .runner
            .run_in_transaction(ctx, move |store| {
                Box::pin(async move { transfer_work(store, params).await })
            })
            .await?;

        info!(
            transfer_id = result.transfer.id,
            from = params.from_account_id,
            to = params.to_account_id,
            amount = params.amount,
            "transfer committed"
        );
        Ok(result)
    }
}

async fn transfer_work<S>(store: &mut S, params: TransferParams) -> Result<TransferResult, AppError>
where
    S: LedgerStore + ?Sized,
{
    let transfer = match store.create_transfer(&params).await {
        Ok(transfer) => transfer,
        Err(err @ StoreError::ConstraintViolation(_)) => {
            // The foreign-key failure does not say which side is missing.
            store.get_account(params.from_account_id).await?;
            store.get_account(params.to_account_id).await?;
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let (debit, credit) = posting_pair(&params);
    let from_entry = store.create_entry(debit.account_id, debit.delta).await?;
    let to_entry = store.create_entry(credit.account_id, credit.delta).await?;

    let [first, second] = lock_ordered_adjustments(&params);
    let first_account = store.add_balance(first.account_id, first.delta).await?;
    let second_account = store.add_balance(second.account_id, second.delta).await?;

    let (from_account, to_account) = if first.account_id == params.from_account_id {
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
