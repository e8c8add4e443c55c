//! Double-entry rules shared by every transfer: which entries a transfer
//! produces and in what order the two balances are touched.

use super::{AccountId, Cents, TransferParams};

/// A signed change to one account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAdjustment {
    pub account_id: AccountId,
    pub delta: Cents,
}

/// The debit and credit a transfer posts: `-amount` on the source,
/// `+amount` on the destination.
pub fn posting_pair(params: &TransferParams) -> (BalanceAdjustment, BalanceAdjustment) {
    (
        BalanceAdjustment {
            account_id: params.from_account_id,
            delta: -params.amount,
        },
        BalanceAdjustment {
            account_id: params.to_account_id,
            delta: params.amount,
        },
    )
}

/// The balance adjustments of a transfer in lock-acquisition order.
///
/// Updating a balance takes a write lock on the account row, so every transfer
/// must lock its two accounts in the same global order: ascending account id,
/// whatever the direction of the transfer. Two transfers over the same pair in
/// opposite directions then contend for the lower id first and can never hold
/// one lock each while waiting for the other.
pub fn lock_ordered_adjustments(params: &TransferParams) -> [BalanceAdjustment; 2] {
    let (debit, credit) = posting_pair(params);
    if debit.account_id < credit.account_id {
        [debit, credit]
    } else {
        [credit, debit]
    }
}

/// True when a set of entry amounts nets to zero.
pub fn is_balanced(amounts: &[Cents]) -> bool {
    amounts.iter().sum::<Cents>() == 0
}
