//! Arena holding one payment instruction and everything under it.
//!
//! Aggregates refer to each other only by id. The graph owns the loaded
//! entities, keeps both sides of every link in sync and remembers which
//! aggregates were touched so that a unit of work saves exactly those.

use super::credit::Credit;
use super::extended_data::ExtendedData;
use super::ids::{AggregateKey, CreditId, InstructionId, PaymentId, TransactionId};
use super::instruction::PaymentInstruction;
use super::ledger::LedgerAccount;
use super::payment::Payment;
use super::ports::{Aggregate, PaymentStore};
use super::transaction::{FinancialTransaction, TransactionOwner, TransactionType};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct InstructionGraph {
    instruction: PaymentInstruction,
    payments: BTreeMap<PaymentId, Payment>,
    credits: BTreeMap<CreditId, Credit>,
    transactions: BTreeMap<TransactionId, FinancialTransaction>,
    dirty: BTreeSet<AggregateKey>,
}

impl InstructionGraph {
    /// Starts a graph for an instruction that is not stored yet.
    pub fn new(instruction: PaymentInstruction) -> Self {
        let mut dirty = BTreeSet::new();
        dirty.insert(AggregateKey::Instruction(instruction.id));
        Self {
            instruction,
            payments: BTreeMap::new(),
            credits: BTreeMap::new(),
            transactions: BTreeMap::new(),
            dirty,
        }
    }

    /// Loads the instruction, its payments and credits, and all of their
    /// transactions.
    pub async fn load(store: &dyn PaymentStore, id: InstructionId) -> Result<Self> {
        let instruction = store.load_instruction(id).await?;
        let mut payments = BTreeMap::new();
        let mut credits = BTreeMap::new();
        let mut transactions = BTreeMap::new();

        for payment_id in instruction.payment_ids() {
            let payment = store.load_payment(*payment_id).await?;
            for transaction_id in payment.transaction_ids() {
                let transaction = store.load_transaction(*transaction_id).await?;
                transactions.insert(transaction.id, transaction);
            }
            payments.insert(payment.id, payment);
        }
        for credit_id in instruction.credit_ids() {
            let credit = store.load_credit(*credit_id).await?;
            for transaction_id in credit.transaction_ids() {
                let transaction = store.load_transaction(*transaction_id).await?;
                transactions.insert(transaction.id, transaction);
            }
            credits.insert(credit.id, credit);
        }

        Ok(Self {
            instruction,
            payments,
            credits,
            transactions,
            dirty: BTreeSet::new(),
        })
    }

    pub fn instruction(&self) -> &PaymentInstruction {
        &self.instruction
    }

    pub fn instruction_mut(&mut self) -> &mut PaymentInstruction {
        self.dirty.insert(AggregateKey::Instruction(self.instruction.id));
        &mut self.instruction
    }

    pub fn payment(&self, id: PaymentId) -> Result<&Payment> {
        self.payments
            .get(&id)
            .ok_or(PaymentError::NotFound(AggregateKey::Payment(id)))
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Result<&mut Payment> {
        let payment = self
            .payments
            .get_mut(&id)
            .ok_or(PaymentError::NotFound(AggregateKey::Payment(id)))?;
        self.dirty.insert(AggregateKey::Payment(id));
        Ok(payment)
    }

    pub fn credit(&self, id: CreditId) -> Result<&Credit> {
        self.credits
            .get(&id)
            .ok_or(PaymentError::NotFound(AggregateKey::Credit(id)))
    }

    pub fn credit_mut(&mut self, id: CreditId) -> Result<&mut Credit> {
        let credit = self
            .credits
            .get_mut(&id)
            .ok_or(PaymentError::NotFound(AggregateKey::Credit(id)))?;
        self.dirty.insert(AggregateKey::Credit(id));
        Ok(credit)
    }

    pub fn transaction(&self, id: TransactionId) -> Result<&FinancialTransaction> {
        self.transactions
            .get(&id)
            .ok_or(PaymentError::NotFound(AggregateKey::Transaction(id)))
    }

    pub fn transaction_mut(&mut self, id: TransactionId) -> Result<&mut FinancialTransaction> {
        let transaction = self
            .transactions
            .get_mut(&id)
            .ok_or(PaymentError::NotFound(AggregateKey::Transaction(id)))?;
        self.dirty.insert(AggregateKey::Transaction(id));
        Ok(transaction)
    }

    pub fn payments(&self) -> impl Iterator<Item = &Payment> {
        self.instruction
            .payment_ids()
            .iter()
            .filter_map(move |id| self.payments.get(id))
    }

    pub fn credits(&self) -> impl Iterator<Item = &Credit> {
        self.instruction
            .credit_ids()
            .iter()
            .filter_map(move |id| self.credits.get(id))
    }

    /// Adds a payment to the instruction, setting both sides of the link.
    pub fn add_payment(&mut self, payment: Payment) -> Result<PaymentId> {
        if payment.instruction_id != self.instruction.id {
            return Err(PaymentError::InvalidState(format!(
                "payment {} belongs to another instruction",
                payment.id
            )));
        }
        let id = payment.id;
        self.instruction_mut().payments.push(id);
        self.payments.insert(id, payment);
        self.dirty.insert(AggregateKey::Payment(id));
        Ok(id)
    }

    /// Adds a credit to the instruction. A dependent credit's payment must be
    /// part of the same instruction.
    pub fn add_credit(&mut self, credit: Credit) -> Result<CreditId> {
        if credit.instruction_id != self.instruction.id {
            return Err(PaymentError::InvalidState(format!(
                "credit {} belongs to another instruction",
                credit.id
            )));
        }
        if let Some(payment_id) = credit.payment_id {
            if !self.payments.contains_key(&payment_id) {
                return Err(PaymentError::InvalidState(format!(
                    "payment {payment_id} is not part of payment instruction {}",
                    self.instruction.id
                )));
            }
        }
        let id = credit.id;
        self.instruction_mut().credits.push(id);
        self.credits.insert(id, credit);
        self.dirty.insert(AggregateKey::Credit(id));
        Ok(id)
    }

    /// Appends a transaction to its owner and binds the back-link.
    pub fn attach_transaction(
        &mut self,
        owner: TransactionOwner,
        mut transaction: FinancialTransaction,
    ) -> Result<TransactionId> {
        transaction.bind(owner)?;
        let id = transaction.id;
        match owner {
            TransactionOwner::Payment(payment_id) => {
                self.payment_mut(payment_id)?.transactions.push(id)
            }
            TransactionOwner::Credit(credit_id) => self.credit_mut(credit_id)?.transactions.push(id),
        }
        self.transactions.insert(id, transaction);
        self.dirty.insert(AggregateKey::Transaction(id));
        Ok(id)
    }

    /// Transactions of one aggregate, oldest first.
    pub fn transactions_of(
        &self,
        owner: TransactionOwner,
    ) -> impl Iterator<Item = &FinancialTransaction> {
        let ids: &[TransactionId] = match owner {
            TransactionOwner::Payment(id) => self
                .payments
                .get(&id)
                .map(|payment| payment.transactions.as_slice())
                .unwrap_or(&[]),
            TransactionOwner::Credit(id) => self
                .credits
                .get(&id)
                .map(|credit| credit.transactions.as_slice())
                .unwrap_or(&[]),
        };
        ids.iter().filter_map(move |id| self.transactions.get(id))
    }

    fn transactions_of_type(
        &self,
        owner: TransactionOwner,
        types: &'static [TransactionType],
    ) -> impl Iterator<Item = &FinancialTransaction> {
        self.transactions_of(owner)
            .filter(move |transaction| types.contains(&transaction.transaction_type))
    }

    pub fn pending_transaction(&self, owner: TransactionOwner) -> Option<&FinancialTransaction> {
        self.transactions_of(owner)
            .find(|transaction| transaction.is_pending())
    }

    pub fn has_pending_transaction(&self, owner: TransactionOwner) -> bool {
        self.pending_transaction(owner).is_some()
    }

    /// First pending transaction anywhere under the instruction, payments
    /// before credits.
    pub fn instruction_pending_transaction(&self) -> Option<&FinancialTransaction> {
        let from_payments = self
            .instruction
            .payment_ids()
            .iter()
            .find_map(move |id| self.pending_transaction(TransactionOwner::Payment(*id)));
        from_payments.or_else(move || {
            self.instruction
                .credit_ids()
                .iter()
                .find_map(move |id| self.pending_transaction(TransactionOwner::Credit(*id)))
        })
    }

    pub fn approve_transaction(&self, payment: PaymentId) -> Option<&FinancialTransaction> {
        self.transactions_of_type(
            TransactionOwner::Payment(payment),
            &[TransactionType::Approve, TransactionType::ApproveAndDeposit],
        )
        .next()
    }

    pub fn deposit_transactions(&self, payment: PaymentId) -> Vec<&FinancialTransaction> {
        self.transactions_of_type(
            TransactionOwner::Payment(payment),
            &[TransactionType::Deposit],
        )
        .collect()
    }

    pub fn reverse_approval_transactions(&self, payment: PaymentId) -> Vec<&FinancialTransaction> {
        self.transactions_of_type(
            TransactionOwner::Payment(payment),
            &[TransactionType::ReverseApproval],
        )
        .collect()
    }

    pub fn reverse_deposit_transactions(&self, payment: PaymentId) -> Vec<&FinancialTransaction> {
        self.transactions_of_type(
            TransactionOwner::Payment(payment),
            &[TransactionType::ReverseDeposit],
        )
        .collect()
    }

    pub fn credit_transaction(&self, credit: CreditId) -> Option<&FinancialTransaction> {
        self.transactions_of_type(TransactionOwner::Credit(credit), &[TransactionType::Credit])
            .next()
    }

    pub fn reverse_credit_transactions(&self, credit: CreditId) -> Vec<&FinancialTransaction> {
        self.transactions_of_type(
            TransactionOwner::Credit(credit),
            &[TransactionType::ReverseCredit],
        )
        .collect()
    }

    /// The transaction's own extended data, falling back to the instruction's.
    pub fn extended_data_for(&self, transaction: TransactionId) -> Result<&ExtendedData> {
        let transaction = self.transaction(transaction)?;
        Ok(transaction
            .extended_data
            .as_ref()
            .unwrap_or(&self.instruction.extended_data))
    }

    /// Every ledger account an operation on `owner` moves: the owner, the
    /// payment behind a dependent credit, and the instruction.
    pub fn ledger_accounts(
        &mut self,
        owner: TransactionOwner,
    ) -> Result<Vec<&mut dyn LedgerAccount>> {
        let mut keys = vec![AggregateKey::Instruction(self.instruction.id)];
        let mut accounts: Vec<&mut dyn LedgerAccount> = Vec::with_capacity(3);
        match owner {
            TransactionOwner::Payment(id) => {
                let payment = self
                    .payments
                    .get_mut(&id)
                    .ok_or(PaymentError::NotFound(AggregateKey::Payment(id)))?;
                keys.push(AggregateKey::Payment(id));
                accounts.push(payment);
            }
            TransactionOwner::Credit(id) => {
                let credit = self
                    .credits
                    .get_mut(&id)
                    .ok_or(PaymentError::NotFound(AggregateKey::Credit(id)))?;
                keys.push(AggregateKey::Credit(id));
                if let Some(payment_id) = credit.payment_id {
                    let payment = self
                        .payments
                        .get_mut(&payment_id)
                        .ok_or(PaymentError::NotFound(AggregateKey::Payment(payment_id)))?;
                    keys.push(AggregateKey::Payment(payment_id));
                    accounts.push(payment);
                }
                accounts.push(credit);
            }
        }
        accounts.push(&mut self.instruction);
        self.dirty.extend(keys);
        Ok(accounts)
    }

    pub fn set_attention_required(&mut self, owner: TransactionOwner, required: bool) -> Result<()> {
        match owner {
            TransactionOwner::Payment(id) => self.payment_mut(id)?.attention_required = required,
            TransactionOwner::Credit(id) => self.credit_mut(id)?.attention_required = required,
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Stamps `updated_at` on everything that will be saved.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        for key in &self.dirty {
            match key {
                AggregateKey::Instruction(_) => self.instruction.updated_at = Some(now),
                AggregateKey::Payment(id) => {
                    if let Some(payment) = self.payments.get_mut(id) {
                        payment.updated_at = Some(now);
                    }
                }
                AggregateKey::Credit(id) => {
                    if let Some(credit) = self.credits.get_mut(id) {
                        credit.updated_at = Some(now);
                    }
                }
                AggregateKey::Transaction(id) => {
                    if let Some(transaction) = self.transactions.get_mut(id) {
                        transaction.updated_at = Some(now);
                    }
                }
            }
        }
    }

    /// Drains the touched aggregates for one `save_all` call.
    pub fn take_dirty(&mut self) -> Vec<Aggregate> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|key| match key {
                AggregateKey::Instruction(_) => {
                    Some(Aggregate::Instruction(self.instruction.clone()))
                }
                AggregateKey::Payment(id) => self.payments.get(&id).cloned().map(Aggregate::Payment),
                AggregateKey::Credit(id) => self.credits.get(&id).cloned().map(Aggregate::Credit),
                AggregateKey::Transaction(id) => self
                    .transactions
                    .get(&id)
                    .cloned()
                    .map(Aggregate::Transaction),
            })
            .collect()
    }
}
