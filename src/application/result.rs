use crate::domain::credit::Credit;
use crate::domain::instruction::PaymentInstruction;
use crate::domain::payment::Payment;
use crate::domain::plugin::ActionRequest;
use crate::domain::transaction::{FinancialTransaction, TransactionState};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
    Pending,
}

/// What a lifecycle operation hands back: the transaction it created and the
/// aggregates as they were saved.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub status: ResultStatus,
    pub transaction: FinancialTransaction,
    pub instruction: PaymentInstruction,
    pub payment: Option<Payment>,
    pub credit: Option<Credit>,
    /// Set when the gateway needs the caller to act before it can finish.
    pub action: Option<ActionRequest>,
}

impl OperationResult {
    pub fn status_of(transaction: &FinancialTransaction) -> ResultStatus {
        match transaction.state() {
            TransactionState::Success => ResultStatus::Success,
            TransactionState::Failed => ResultStatus::Failed,
            TransactionState::New | TransactionState::Pending => ResultStatus::Pending,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn reason_code(&self) -> Option<&str> {
        self.transaction.reason_code.as_deref()
    }
}
