use super::ids::{InstructionId, PaymentId, TransactionId};
use super::ledger::{Bucket, Counters, LedgerAccount};
use super::money::{Amount, Balance};
use super::transaction::TransactionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    New,
    Approving,
    Approved,
    Depositing,
    Deposited,
    Expired,
    Failed,
    Canceled,
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentState::New => "new",
            PaymentState::Approving => "approving",
            PaymentState::Approved => "approved",
            PaymentState::Depositing => "depositing",
            PaymentState::Deposited => "deposited",
            PaymentState::Expired => "expired",
            PaymentState::Failed => "failed",
            PaymentState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// A flow of funds from the payer under one instruction.
///
/// Tracks what has been approved and deposited, plus credits issued against
/// it. Amounts only change through the [`ledger`](super::ledger).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub instruction_id: InstructionId,
    pub target_amount: Amount,
    pub state: PaymentState,
    pub approved_amount: Balance,
    pub approving_amount: Balance,
    pub deposited_amount: Balance,
    pub depositing_amount: Balance,
    pub credited_amount: Balance,
    pub crediting_amount: Balance,
    pub reversing_approved_amount: Balance,
    pub reversing_deposited_amount: Balance,
    pub reversing_credited_amount: Balance,
    pub expiration_date: Option<DateTime<Utc>>,
    pub attention_required: bool,
    expired: bool,
    /// Back-links into the instruction graph. Only the graph appends here.
    pub(crate) transactions: Vec<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(instruction_id: InstructionId, target_amount: Amount) -> Self {
        Self {
            id: PaymentId::new(),
            instruction_id,
            target_amount,
            state: PaymentState::New,
            approved_amount: Balance::ZERO,
            approving_amount: Balance::ZERO,
            deposited_amount: Balance::ZERO,
            depositing_amount: Balance::ZERO,
            credited_amount: Balance::ZERO,
            crediting_amount: Balance::ZERO,
            reversing_approved_amount: Balance::ZERO,
            reversing_deposited_amount: Balance::ZERO,
            reversing_credited_amount: Balance::ZERO,
            expiration_date: None,
            attention_required: false,
            expired: false,
            transactions: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn transaction_ids(&self) -> &[TransactionId] {
        &self.transactions
    }

    pub fn set_expired(&mut self, expired: bool) {
        self.expired = expired;
    }

    /// Expiry is evaluated when asked, never swept in the background.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.expired {
            return true;
        }
        self.expiration_date.is_some_and(|date| date < now)
    }

    /// State as reported to callers, taking expiry into account.
    pub fn effective_state(&self) -> PaymentState {
        if self.is_expired() {
            PaymentState::Expired
        } else {
            self.state
        }
    }

    /// Re-derives the state from the counters after the ledger moved them.
    pub fn settle_state(&mut self) {
        self.state = if !self.approving_amount.is_zero() {
            PaymentState::Approving
        } else if !self.depositing_amount.is_zero() {
            PaymentState::Depositing
        } else if !self.deposited_amount.is_zero() && self.deposited_amount == self.approved_amount
        {
            PaymentState::Deposited
        } else if !self.approved_amount.is_zero() {
            PaymentState::Approved
        } else {
            match self.state {
                // Nothing approved any more after a reversal.
                PaymentState::Approved | PaymentState::Deposited | PaymentState::Canceled => {
                    PaymentState::Canceled
                }
                PaymentState::Failed => PaymentState::Failed,
                _ => PaymentState::New,
            }
        };
    }

    /// Marks a failed approval when nothing has been approved so far.
    pub fn record_failed_approval(&mut self) {
        self.settle_state();
        if self.approved_amount.is_zero() && self.state == PaymentState::New {
            self.state = PaymentState::Failed;
        }
    }
}

impl LedgerAccount for Payment {
    fn ledger_name(&self) -> String {
        format!("payment {}", self.id)
    }

    fn headroom(&self, transaction_type: TransactionType) -> Option<Balance> {
        let target = Balance::from(self.target_amount);
        let headroom = match transaction_type {
            TransactionType::Approve | TransactionType::ApproveAndDeposit => {
                target - self.approved_amount - self.approving_amount
            }
            TransactionType::Deposit => {
                self.approved_amount - self.deposited_amount - self.depositing_amount
            }
            TransactionType::ReverseApproval => {
                self.approved_amount
                    - self.deposited_amount
                    - self.depositing_amount
                    - self.reversing_approved_amount
            }
            TransactionType::ReverseDeposit => {
                self.deposited_amount - self.reversing_deposited_amount
            }
            TransactionType::Credit => {
                self.deposited_amount - self.credited_amount - self.crediting_amount
            }
            TransactionType::ReverseCredit => {
                self.credited_amount - self.reversing_credited_amount
            }
        };
        Some(headroom)
    }

    fn counters(&mut self, bucket: Bucket) -> Option<Counters<'_>> {
        let (pending, settled) = match bucket {
            Bucket::Approval => (&mut self.approving_amount, &mut self.approved_amount),
            Bucket::Deposit => (&mut self.depositing_amount, &mut self.deposited_amount),
            Bucket::Credit => (&mut self.crediting_amount, &mut self.credited_amount),
            Bucket::ApprovalReversal => (
                &mut self.reversing_approved_amount,
                &mut self.approved_amount,
            ),
            Bucket::DepositReversal => (
                &mut self.reversing_deposited_amount,
                &mut self.deposited_amount,
            ),
            Bucket::CreditReversal => (
                &mut self.reversing_credited_amount,
                &mut self.credited_amount,
            ),
        };
        Some(Counters { pending, settled })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn payment(target: rust_decimal::Decimal) -> Payment {
        Payment::new(InstructionId::new(), Amount::new(target).unwrap())
    }

    #[test]
    fn test_new_payment_is_empty() {
        let payment = payment(dec!(100));
        assert_eq!(payment.state, PaymentState::New);
        assert_eq!(payment.approved_amount, Balance::ZERO);
        assert!(payment.transaction_ids().is_empty());
        assert!(!payment.is_expired());
    }

    #[test]
    fn test_expiry_is_read_time() {
        let mut payment = payment(dec!(100));
        let now = Utc::now();
        payment.expiration_date = Some(now + Duration::hours(1));
        assert!(!payment.is_expired_at(now));
        assert!(payment.is_expired_at(now + Duration::hours(2)));

        payment.expiration_date = None;
        payment.set_expired(true);
        assert!(payment.is_expired_at(now));
        assert_eq!(payment.effective_state(), PaymentState::Expired);
    }

    #[test]
    fn test_deposit_headroom_is_bounded_by_approval() {
        let mut payment = payment(dec!(100));
        payment.approved_amount = Balance::new(dec!(60));
        assert_eq!(
            payment.headroom(TransactionType::Deposit),
            Some(Balance::new(dec!(60)))
        );
        assert_eq!(
            payment.headroom(TransactionType::Approve),
            Some(Balance::new(dec!(40)))
        );
    }

    #[test]
    fn test_settle_state_follows_counters() {
        let mut payment = payment(dec!(100));
        let sixty = Amount::new(dec!(60)).unwrap();

        ledger::reserve(&mut payment, TransactionType::Approve, sixty).unwrap();
        payment.settle_state();
        assert_eq!(payment.state, PaymentState::Approving);

        ledger::commit(&mut payment, TransactionType::Approve, sixty, sixty.into()).unwrap();
        payment.settle_state();
        assert_eq!(payment.state, PaymentState::Approved);

        ledger::reserve(&mut payment, TransactionType::Deposit, sixty).unwrap();
        ledger::commit(&mut payment, TransactionType::Deposit, sixty, sixty.into()).unwrap();
        payment.settle_state();
        assert_eq!(payment.state, PaymentState::Deposited);
    }

    #[test]
    fn test_failed_first_approval() {
        let mut payment = payment(dec!(100));
        payment.record_failed_approval();
        assert_eq!(payment.state, PaymentState::Failed);
    }

    #[test]
    fn test_full_reversal_cancels() {
        let mut payment = payment(dec!(100));
        payment.approved_amount = Balance::new(dec!(30));
        payment.settle_state();
        assert_eq!(payment.state, PaymentState::Approved);

        payment.approved_amount = Balance::ZERO;
        payment.settle_state();
        assert_eq!(payment.state, PaymentState::Canceled);
    }
}
