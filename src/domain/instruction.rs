use super::extended_data::ExtendedData;
use super::ids::{CreditId, InstructionId, PaymentId};
use super::ledger::{Bucket, Counters, LedgerAccount};
use super::money::{Amount, Balance};
use super::transaction::TransactionType;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered; an instruction only ever moves forward.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstructionState {
    #[default]
    New,
    InProgress,
    Closed,
}

impl fmt::Display for InstructionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstructionState::New => "new",
            InstructionState::InProgress => "in_progress",
            InstructionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Root aggregate: one payment arrangement with a fixed amount and currency.
///
/// The instruction mirrors the sums of its payments' and credits' counters
/// so that the amount bound can be checked without loading every child.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentInstruction {
    pub id: InstructionId,
    pub amount: Amount,
    pub currency: String,
    pub payment_system_name: String,
    state: InstructionState,
    pub approved_amount: Balance,
    pub approving_amount: Balance,
    pub deposited_amount: Balance,
    pub depositing_amount: Balance,
    pub credited_amount: Balance,
    pub crediting_amount: Balance,
    pub reversing_approved_amount: Balance,
    pub reversing_deposited_amount: Balance,
    pub reversing_credited_amount: Balance,
    pub extended_data: ExtendedData,
    pub(crate) payments: Vec<PaymentId>,
    pub(crate) credits: Vec<CreditId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentInstruction {
    pub fn new(
        amount: Amount,
        currency: impl Into<String>,
        payment_system_name: impl Into<String>,
        extended_data: ExtendedData,
    ) -> Self {
        Self {
            id: InstructionId::new(),
            amount,
            currency: currency.into(),
            payment_system_name: payment_system_name.into(),
            state: InstructionState::New,
            approved_amount: Balance::ZERO,
            approving_amount: Balance::ZERO,
            deposited_amount: Balance::ZERO,
            depositing_amount: Balance::ZERO,
            credited_amount: Balance::ZERO,
            crediting_amount: Balance::ZERO,
            reversing_approved_amount: Balance::ZERO,
            reversing_deposited_amount: Balance::ZERO,
            reversing_credited_amount: Balance::ZERO,
            extended_data,
            payments: Vec::new(),
            credits: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn state(&self) -> InstructionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == InstructionState::Closed
    }

    pub fn payment_ids(&self) -> &[PaymentId] {
        &self.payments
    }

    pub fn credit_ids(&self) -> &[CreditId] {
        &self.credits
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(PaymentError::InstructionClosed(self.id))
        } else {
            Ok(())
        }
    }

    /// Moves the state forward. Staying put is allowed, going back is not.
    pub fn advance(&mut self, next: InstructionState) -> Result<()> {
        if next < self.state {
            return Err(PaymentError::InvalidState(format!(
                "payment instruction {} cannot go from {} back to {next}",
                self.id, self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// What may still be approved across all payments.
    pub fn unapproved_amount(&self) -> Balance {
        (Balance::from(self.amount) - self.approved_amount - self.approving_amount).floor_zero()
    }
}

impl LedgerAccount for PaymentInstruction {
    fn ledger_name(&self) -> String {
        format!("payment instruction {}", self.id)
    }

    fn headroom(&self, transaction_type: TransactionType) -> Option<Balance> {
        match transaction_type {
            TransactionType::Approve | TransactionType::ApproveAndDeposit => Some(
                Balance::from(self.amount) - self.approved_amount - self.approving_amount,
            ),
            // Payments and credits bound everything else.
            _ => None,
        }
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
