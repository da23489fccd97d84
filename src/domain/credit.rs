use super::ids::{CreditId, InstructionId, PaymentId, TransactionId};
use super::ledger::{Bucket, Counters, LedgerAccount};
use super::money::{Amount, Balance};
use super::transaction::TransactionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreditState {
    #[default]
    New,
    Crediting,
    Credited,
    Failed,
    Canceled,
}

impl fmt::Display for CreditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CreditState::New => "new",
            CreditState::Crediting => "crediting",
            CreditState::Credited => "credited",
            CreditState::Failed => "failed",
            CreditState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// A flow of funds back to the payer.
///
/// A credit with a `payment_id` is dependent on that payment; without one it
/// is independent and only bounded by its own target.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Credit {
    pub id: CreditId,
    pub instruction_id: InstructionId,
    pub payment_id: Option<PaymentId>,
    pub target_amount: Amount,
    pub state: CreditState,
    pub credited_amount: Balance,
    pub crediting_amount: Balance,
    pub reversing_amount: Balance,
    pub attention_required: bool,
    pub(crate) transactions: Vec<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Credit {
    pub fn independent(instruction_id: InstructionId, target_amount: Amount) -> Self {
        Self {
            id: CreditId::new(),
            instruction_id,
            payment_id: None,
            target_amount,
            state: CreditState::New,
            credited_amount: Balance::ZERO,
            crediting_amount: Balance::ZERO,
            reversing_amount: Balance::ZERO,
            attention_required: false,
            transactions: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn dependent(
        instruction_id: InstructionId,
        payment_id: PaymentId,
        target_amount: Amount,
    ) -> Self {
        Self {
            payment_id: Some(payment_id),
            ..Self::independent(instruction_id, target_amount)
        }
    }

    pub fn is_independent(&self) -> bool {
        self.payment_id.is_none()
    }

    pub fn transaction_ids(&self) -> &[TransactionId] {
        &self.transactions
    }

    pub fn settle_state(&mut self) {
        self.state = if !self.crediting_amount.is_zero() {
            CreditState::Crediting
        } else if !self.credited_amount.is_zero() {
            CreditState::Credited
        } else {
            match self.state {
                CreditState::Credited | CreditState::Canceled => CreditState::Canceled,
                CreditState::Failed => CreditState::Failed,
                _ => CreditState::New,
            }
        };
    }

    pub fn record_failed_credit(&mut self) {
        self.settle_state();
        if self.credited_amount.is_zero() && self.state == CreditState::New {
            self.state = CreditState::Failed;
        }
    }
}

impl LedgerAccount for Credit {
    fn ledger_name(&self) -> String {
        format!("credit {}", self.id)
    }

    fn headroom(&self, transaction_type: TransactionType) -> Option<Balance> {
        match transaction_type {
            TransactionType::Credit => Some(
                Balance::from(self.target_amount) - self.credited_amount - self.crediting_amount,
            ),
            TransactionType::ReverseCredit => Some(self.credited_amount - self.reversing_amount),
            // Not tracked here; `counters` rejects them.
            _ => None,
        }
    }

    fn counters(&mut self, bucket: Bucket) -> Option<Counters<'_>> {
        match bucket {
            Bucket::Credit => Some(Counters {
                pending: &mut self.crediting_amount,
                settled: &mut self.credited_amount,
            }),
            Bucket::CreditReversal => Some(Counters {
                pending: &mut self.reversing_amount,
                settled: &mut self.credited_amount,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger;
    use crate::error::PaymentError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_independent_vs_dependent() {
        let instruction = InstructionId::new();
        let amount = Amount::new(dec!(10)).unwrap();
        assert!(Credit::independent(instruction, amount).is_independent());
        assert!(!Credit::dependent(instruction, PaymentId::new(), amount).is_independent());
    }

    #[test]
    fn test_credit_cannot_exceed_target() {
        let mut credit = Credit::independent(InstructionId::new(), Amount::new(dec!(25)).unwrap());
        let result = ledger::reserve(
            &mut credit,
            TransactionType::Credit,
            Amount::new(dec!(25.01)).unwrap(),
        );
        assert!(matches!(result, Err(PaymentError::Overflow { .. })));
    }

    #[test]
    fn test_credit_and_reverse() {
        let mut credit = Credit::independent(InstructionId::new(), Amount::new(dec!(25)).unwrap());
        let full = Amount::new(dec!(25)).unwrap();
        ledger::reserve(&mut credit, TransactionType::Credit, full).unwrap();
        ledger::commit(&mut credit, TransactionType::Credit, full, full.into()).unwrap();
        credit.settle_state();
        assert_eq!(credit.state, CreditState::Credited);

        ledger::reserve(&mut credit, TransactionType::ReverseCredit, full).unwrap();
        assert_eq!(credit.reversing_amount, Balance::new(dec!(25)));
        ledger::commit(&mut credit, TransactionType::ReverseCredit, full, full.into()).unwrap();
        credit.settle_state();
        assert_eq!(credit.credited_amount, Balance::ZERO);
        assert_eq!(credit.state, CreditState::Canceled);
    }

    #[test]
    fn test_credit_does_not_track_approvals() {
        let mut credit = Credit::independent(InstructionId::new(), Amount::new(dec!(5)).unwrap());
        let result = ledger::reserve(
            &mut credit,
            TransactionType::Approve,
            Amount::new(dec!(1)).unwrap(),
        );
        assert!(matches!(result, Err(PaymentError::InvalidState(_))));
    }
}
