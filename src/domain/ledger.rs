//! Amount bookkeeping shared by payments, credits and instructions.
//!
//! Every operation moves money through two counters on each aggregate it
//! touches: a pending ("-ing") counter while the gateway call is in flight,
//! and a settled counter once the outcome is known.
//!
//! | type                  | pending                  | settled               | commit |
//! |-----------------------|--------------------------|-----------------------|--------|
//! | `Approve`             | approving                | approved              | `+=`   |
//! | `Deposit`             | depositing               | deposited             | `+=`   |
//! | `ApproveAndDeposit`   | approving and depositing | approved and deposited| `+=`   |
//! | `ReverseApproval`     | reversing approved       | approved              | `-=`   |
//! | `ReverseDeposit`      | reversing deposited      | deposited             | `-=`   |
//! | `Credit`              | crediting                | credited              | `+=`   |
//! | `ReverseCredit`       | reversing credited       | credited              | `-=`   |
//!
//! These functions only mutate in-memory aggregates. Persisting the result is
//! the caller's job.

use super::money::{Amount, Balance};
use super::transaction::TransactionType;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;

/// One pending/settled counter pair on an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Approval,
    Deposit,
    Credit,
    ApprovalReversal,
    DepositReversal,
    CreditReversal,
}

impl Bucket {
    /// The buckets a transaction type moves, primary bucket first.
    pub fn for_transaction(transaction_type: TransactionType) -> &'static [Bucket] {
        match transaction_type {
            TransactionType::Approve => &[Bucket::Approval],
            TransactionType::ApproveAndDeposit => &[Bucket::Approval, Bucket::Deposit],
            TransactionType::Deposit => &[Bucket::Deposit],
            TransactionType::Credit => &[Bucket::Credit],
            TransactionType::ReverseApproval => &[Bucket::ApprovalReversal],
            TransactionType::ReverseDeposit => &[Bucket::DepositReversal],
            TransactionType::ReverseCredit => &[Bucket::CreditReversal],
        }
    }

    /// Reversal buckets reduce the settled counter on commit.
    pub fn reduces_settled(self) -> bool {
        matches!(
            self,
            Bucket::ApprovalReversal | Bucket::DepositReversal | Bucket::CreditReversal
        )
    }
}

/// Mutable view of one counter pair.
pub struct Counters<'a> {
    pub pending: &'a mut Balance,
    pub settled: &'a mut Balance,
}

/// An aggregate whose amounts are kept by the ledger.
pub trait LedgerAccount {
    /// Human readable name used in error messages.
    fn ledger_name(&self) -> String;

    /// How much more may be reserved for `transaction_type`.
    /// `None` means the aggregate does not bound it.
    fn headroom(&self, transaction_type: TransactionType) -> Option<Balance>;

    /// The counters backing `bucket`, or `None` if the aggregate does not
    /// track it.
    fn counters(&mut self, bucket: Bucket) -> Option<Counters<'_>>;
}

fn counters_for<'a, A: LedgerAccount + ?Sized>(
    account: &'a mut A,
    bucket: Bucket,
) -> Result<Counters<'a>> {
    let name = account.ledger_name();
    account.counters(bucket).ok_or_else(|| {
        PaymentError::InvalidState(format!("{name} does not track {bucket:?} amounts"))
    })
}

/// Checks headroom and moves `amount` into the pending counters.
///
/// Counters are fixed-precision decimals. A reservation whose counters could
/// no longer hold the settled total is refused like any other overflow, so a
/// later `commit` of it always fits.
pub fn reserve<A: LedgerAccount + ?Sized>(
    account: &mut A,
    transaction_type: TransactionType,
    amount: Amount,
) -> Result<()> {
    let name = account.ledger_name();
    let requested = Balance::from(amount);
    if let Some(available) = account.headroom(transaction_type) {
        if requested > available {
            return Err(PaymentError::Overflow {
                target: name,
                transaction_type,
                requested: requested.value(),
                available: available.floor_zero().value(),
            });
        }
    }

    // Resolve every bucket before touching any so a refused one leaves the
    // account unchanged.
    let buckets = Bucket::for_transaction(transaction_type);
    let mut reserved = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let counters = counters_for(account, *bucket)?;
        let outstanding = if bucket.reduces_settled() {
            Some(*counters.pending)
        } else {
            counters.settled.checked_add(*counters.pending)
        };
        let next = counters.pending.checked_add(requested);
        let total = outstanding.and_then(|outstanding| outstanding.checked_add(requested));
        let (Some(next), Some(_)) = (next, total) else {
            let used = outstanding.map_or(Decimal::MAX, |outstanding| outstanding.value());
            return Err(PaymentError::Overflow {
                target: name,
                transaction_type,
                requested: requested.value(),
                available: Decimal::MAX.checked_sub(used).unwrap_or(Decimal::ZERO),
            });
        };
        reserved.push((*bucket, next));
    }
    for (bucket, next) in reserved {
        *counters_for(account, bucket)?.pending = next;
    }
    Ok(())
}

/// Settles a reservation of `requested` with what the gateway processed.
///
/// `processed` is clamped to `requested`; a smaller value is a partial
/// settlement and the remainder of the reservation is dropped.
pub fn commit<A: LedgerAccount + ?Sized>(
    account: &mut A,
    transaction_type: TransactionType,
    requested: Amount,
    processed: Balance,
) -> Result<Balance> {
    let requested = Balance::from(requested);
    let processed = processed.floor_zero().min(requested);
    let name = account.ledger_name();

    let buckets = Bucket::for_transaction(transaction_type);
    let mut settled = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let counters = counters_for(account, *bucket)?;
        if *counters.pending < requested {
            return Err(PaymentError::LedgerInvariant(format!(
                "{name}: pending {bucket:?} amount {} is below the committed {requested}",
                counters.pending
            )));
        }
        if bucket.reduces_settled() && *counters.settled < processed {
            return Err(PaymentError::LedgerInvariant(format!(
                "{name}: cannot reverse {processed} of settled {bucket:?} amount {}",
                counters.settled
            )));
        }
        let next = if bucket.reduces_settled() {
            *counters.settled - processed
        } else {
            counters.settled.checked_add(processed).ok_or_else(|| {
                PaymentError::LedgerInvariant(format!(
                    "{name}: settled {bucket:?} amount {} cannot grow by {processed}",
                    counters.settled
                ))
            })?
        };
        settled.push((*bucket, next));
    }

    for (bucket, next) in settled {
        let counters = counters_for(account, bucket)?;
        *counters.pending -= requested;
        *counters.settled = next;
    }
    Ok(processed)
}

/// Rolls back a reservation that will not settle.
pub fn release<A: LedgerAccount + ?Sized>(
    account: &mut A,
    transaction_type: TransactionType,
    amount: Amount,
) -> Result<()> {
    let amount = Balance::from(amount);
    let name = account.ledger_name();

    for bucket in Bucket::for_transaction(transaction_type) {
        let counters = counters_for(account, *bucket)?;
        if *counters.pending < amount {
            return Err(PaymentError::LedgerInvariant(format!(
                "{name}: cannot release {amount} from pending {bucket:?} amount {}",
                counters.pending
            )));
        }
    }
    for bucket in Bucket::for_transaction(transaction_type) {
        let counters = counters_for(account, *bucket)?;
        *counters.pending -= amount;
    }
    Ok(())
}
