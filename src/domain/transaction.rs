use super::extended_data::ExtendedData;
use super::ids::{AggregateKey, CreditId, PaymentId, TransactionId};
use super::money::{Amount, Balance};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Approve,
    ApproveAndDeposit,
    Deposit,
    Credit,
    ReverseApproval,
    ReverseDeposit,
    ReverseCredit,
}

impl TransactionType {
    pub const ALL: [TransactionType; 7] = [
        TransactionType::Approve,
        TransactionType::ApproveAndDeposit,
        TransactionType::Deposit,
        TransactionType::Credit,
        TransactionType::ReverseApproval,
        TransactionType::ReverseDeposit,
        TransactionType::ReverseCredit,
    ];

    /// Whether the transaction runs against a credit rather than a payment.
    pub fn is_credit_side(self) -> bool {
        matches!(self, TransactionType::Credit | TransactionType::ReverseCredit)
    }

    pub fn is_reversal(self) -> bool {
        matches!(
            self,
            TransactionType::ReverseApproval
                | TransactionType::ReverseDeposit
                | TransactionType::ReverseCredit
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Approve => "approve",
            TransactionType::ApproveAndDeposit => "approve_and_deposit",
            TransactionType::Deposit => "deposit",
            TransactionType::Credit => "credit",
            TransactionType::ReverseApproval => "reverse_approval",
            TransactionType::ReverseDeposit => "reverse_deposit",
            TransactionType::ReverseCredit => "reverse_credit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    #[default]
    New,
    Pending,
    Success,
    Failed,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Success | TransactionState::Failed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::New => "new",
            TransactionState::Pending => "pending",
            TransactionState::Success => "success",
            TransactionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The aggregate a transaction belongs to. Exactly one, fixed on attach.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
pub enum TransactionOwner {
    Payment(PaymentId),
    Credit(CreditId),
}

impl From<TransactionOwner> for AggregateKey {
    fn from(owner: TransactionOwner) -> Self {
        match owner {
            TransactionOwner::Payment(id) => AggregateKey::Payment(id),
            TransactionOwner::Credit(id) => AggregateKey::Credit(id),
        }
    }
}

/// Gateway-reported codes copied onto a transaction when it settles.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct GatewayCodes {
    pub reason_code: Option<String>,
    pub response_code: Option<String>,
    pub reference_number: Option<String>,
    pub tracking_id: Option<String>,
}

/// One attempted gateway operation and its outcome.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FinancialTransaction {
    pub id: TransactionId,
    owner: Option<TransactionOwner>,
    pub transaction_type: TransactionType,
    state: TransactionState,
    pub requested_amount: Amount,
    processed_amount: Balance,
    pub reason_code: Option<String>,
    pub response_code: Option<String>,
    pub reference_number: Option<String>,
    pub tracking_id: Option<String>,
    /// Overrides the instruction's extended data for this transaction only.
    pub extended_data: Option<ExtendedData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FinancialTransaction {
    pub fn new(transaction_type: TransactionType, requested_amount: Amount) -> Self {
        Self {
            id: TransactionId::new(),
            owner: None,
            transaction_type,
            state: TransactionState::New,
            requested_amount,
            processed_amount: Balance::ZERO,
            reason_code: None,
            response_code: None,
            reference_number: None,
            tracking_id: None,
            extended_data: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn owner(&self) -> Option<TransactionOwner> {
        self.owner
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn processed_amount(&self) -> Balance {
        self.processed_amount
    }

    pub fn is_pending(&self) -> bool {
        self.state == TransactionState::Pending
    }

    /// Sets the back-link to the owning aggregate. A transaction can be
    /// bound once.
    pub(crate) fn bind(&mut self, owner: TransactionOwner) -> Result<()> {
        match self.owner {
            None => {
                self.owner = Some(owner);
                Ok(())
            }
            Some(existing) if existing == owner => Ok(()),
            Some(existing) => Err(PaymentError::InvalidState(format!(
                "transaction {} already belongs to {existing:?}",
                self.id
            ))),
        }
    }

    /// NEW -> PENDING, on dispatch.
    pub fn mark_pending(&mut self) -> Result<()> {
        self.transition(TransactionState::New, TransactionState::Pending)
    }

    /// PENDING -> SUCCESS with the processed amount reported by the gateway.
    pub fn succeed(&mut self, processed: Balance, codes: GatewayCodes) -> Result<()> {
        self.transition(TransactionState::Pending, TransactionState::Success)?;
        self.processed_amount = processed;
        self.apply_codes(codes);
        Ok(())
    }

    /// PENDING -> FAILED. Nothing was processed.
    pub fn fail(&mut self, codes: GatewayCodes) -> Result<()> {
        self.transition(TransactionState::Pending, TransactionState::Failed)?;
        self.processed_amount = Balance::ZERO;
        self.apply_codes(codes);
        Ok(())
    }

    /// Records codes reported while the transaction stays pending.
    pub fn note_pending(&mut self, codes: GatewayCodes) -> Result<()> {
        if self.state != TransactionState::Pending {
            return Err(PaymentError::InvalidState(format!(
                "transaction {} is {}, not pending",
                self.id, self.state
            )));
        }
        self.apply_codes(codes);
        Ok(())
    }

    fn transition(&mut self, from: TransactionState, to: TransactionState) -> Result<()> {
        if self.state != from {
            return Err(PaymentError::InvalidState(format!(
                "transaction {} cannot move from {} to {to}",
                self.id, self.state
            )));
        }
        self.state = to;
        Ok(())
    }

    fn apply_codes(&mut self, codes: GatewayCodes) {
        // Later reports only fill in what the gateway actually sent.
        if codes.reason_code.is_some() {
            self.reason_code = codes.reason_code;
        }
        if codes.response_code.is_some() {
            self.response_code = codes.response_code;
        }
        if codes.reference_number.is_some() {
            self.reference_number = codes.reference_number;
        }
        if codes.tracking_id.is_some() {
            self.tracking_id = codes.tracking_id;
        }
    }
}
