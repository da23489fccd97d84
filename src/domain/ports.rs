use super::credit::Credit;
use super::ids::{AggregateKey, CreditId, InstructionId, PaymentId, TransactionId};
use super::instruction::PaymentInstruction;
use super::payment::Payment;
use super::transaction::FinancialTransaction;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Any stored aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Instruction(PaymentInstruction),
    Payment(Payment),
    Credit(Credit),
    Transaction(FinancialTransaction),
}

impl Aggregate {
    pub fn key(&self) -> AggregateKey {
        match self {
            Aggregate::Instruction(instruction) => AggregateKey::Instruction(instruction.id),
            Aggregate::Payment(payment) => AggregateKey::Payment(payment.id),
            Aggregate::Credit(credit) => AggregateKey::Credit(credit.id),
            Aggregate::Transaction(transaction) => AggregateKey::Transaction(transaction.id),
        }
    }
}

fn wrong_kind(key: AggregateKey, found: &Aggregate) -> PaymentError {
    PaymentError::InternalError(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("store returned {} for {key}", found.key()),
    )))
}

/// Persistence collaborator.
///
/// `save_all` must be atomic: either every aggregate passed in one call is
/// stored or none is.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn load(&self, key: AggregateKey) -> Result<Option<Aggregate>>;
    async fn save_all(&self, aggregates: Vec<Aggregate>) -> Result<()>;

    async fn load_instruction(&self, id: InstructionId) -> Result<PaymentInstruction> {
        let key = AggregateKey::Instruction(id);
        match self.load(key).await? {
            Some(Aggregate::Instruction(instruction)) => Ok(instruction),
            Some(other) => Err(wrong_kind(key, &other)),
            None => Err(PaymentError::NotFound(key)),
        }
    }

    async fn load_payment(&self, id: PaymentId) -> Result<Payment> {
        let key = AggregateKey::Payment(id);
        match self.load(key).await? {
            Some(Aggregate::Payment(payment)) => Ok(payment),
            Some(other) => Err(wrong_kind(key, &other)),
            None => Err(PaymentError::NotFound(key)),
        }
    }

    async fn load_credit(&self, id: CreditId) -> Result<Credit> {
        let key = AggregateKey::Credit(id);
        match self.load(key).await? {
            Some(Aggregate::Credit(credit)) => Ok(credit),
            Some(other) => Err(wrong_kind(key, &other)),
            None => Err(PaymentError::NotFound(key)),
        }
    }

    async fn load_transaction(&self, id: TransactionId) -> Result<FinancialTransaction> {
        let key = AggregateKey::Transaction(id);
        match self.load(key).await? {
            Some(Aggregate::Transaction(transaction)) => Ok(transaction),
            Some(other) => Err(wrong_kind(key, &other)),
            None => Err(PaymentError::NotFound(key)),
        }
    }
}

pub type PaymentStoreBox = Box<dyn PaymentStore>;
