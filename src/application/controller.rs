use super::locks::InstructionLocks;
use super::registry::PluginRegistry;
use super::result::OperationResult;
use crate::domain::credit::Credit;
use crate::domain::extended_data::ExtendedData;
use crate::domain::graph::InstructionGraph;
use crate::domain::ids::{AggregateKey, CreditId, InstructionId, PaymentId, TransactionId};
use crate::domain::instruction::{InstructionState, PaymentInstruction};
use crate::domain::ledger::{self, LedgerAccount};
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::Payment;
use crate::domain::plugin::{ActionRequest, DispatchContext, OutcomeState, PluginError, PluginOutcome};
use crate::domain::ports::PaymentStoreBox;
use crate::domain::transaction::{FinancialTransaction, TransactionOwner, TransactionType};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long a single gateway call may take before the transaction is
    /// left pending for reconciliation.
    pub dispatch_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(30),
        }
    }
}

/// Entry point for every ledger operation.
///
/// `PluginController` loads the instruction graph an operation touches,
/// moves amounts through the ledger, hands the transaction to the gateway
/// plugin and saves everything it changed in one atomic write. Operations on
/// the same instruction are serialized; different instructions run in
/// parallel.
pub struct PluginController {
    store: PaymentStoreBox,
    plugins: PluginRegistry,
    locks: InstructionLocks,
    config: ControllerConfig,
}

impl PluginController {
    /// Creates a new `PluginController`.
    ///
    /// # Arguments
    ///
    /// * `store` - Where instructions, payments, credits and transactions live.
    /// * `plugins` - Gateway plugins keyed by payment-system name.
    /// * `config` - Dispatch settings.
    pub fn new(store: PaymentStoreBox, plugins: PluginRegistry, config: ControllerConfig) -> Self {
        Self {
            store,
            plugins,
            locks: InstructionLocks::new(),
            config,
        }
    }

    #[instrument(skip(self, extended_data))]
    pub async fn create_payment_instruction(
        &self,
        amount: Amount,
        currency: &str,
        payment_system_name: &str,
        extended_data: ExtendedData,
    ) -> Result<PaymentInstruction> {
        self.plugins.resolve(payment_system_name)?;
        let currency = currency.trim();
        if currency.is_empty() {
            return Err(PaymentError::ValidationError(
                "currency must not be empty".to_string(),
            ));
        }

        let instruction =
            PaymentInstruction::new(amount, currency, payment_system_name, extended_data);
        let mut graph = InstructionGraph::new(instruction);
        self.save(&mut graph).await?;
        info!(instruction = %graph.instruction().id, "payment instruction created");
        Ok(graph.instruction().clone())
    }

    pub async fn get_payment_instruction(&self, id: InstructionId) -> Result<PaymentInstruction> {
        self.store.load_instruction(id).await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<FinancialTransaction> {
        self.store.load_transaction(id).await
    }

    /// Loads a payment, first letting a queryable gateway settle whatever
    /// it still has pending.
    #[instrument(skip(self))]
    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        let owner = TransactionOwner::Payment(id);
        let mut graph = self.refreshed_graph(owner).await?;
        graph.payment(id).cloned()
    }

    /// Loads a credit, reconciling it the same way as [`get_payment`](Self::get_payment).
    #[instrument(skip(self))]
    pub async fn get_credit(&self, id: CreditId) -> Result<Credit> {
        let owner = TransactionOwner::Credit(id);
        let mut graph = self.refreshed_graph(owner).await?;
        graph.credit(id).cloned()
    }

    #[instrument(skip(self))]
    pub async fn create_payment(&self, instruction_id: InstructionId, amount: Amount) -> Result<Payment> {
        let _guard = self.locks.acquire(instruction_id).await;
        let mut graph = InstructionGraph::load(self.store.as_ref(), instruction_id).await?;
        graph.instruction().ensure_open()?;

        if let Some(pending) = graph.instruction_pending_transaction() {
            return Err(PaymentError::ConcurrentOperation {
                aggregate: AggregateKey::Instruction(instruction_id),
                transaction: pending.id,
            });
        }

        let available = graph.instruction().unapproved_amount();
        if Balance::from(amount) > available {
            return Err(PaymentError::Overflow {
                target: graph.instruction().ledger_name(),
                transaction_type: TransactionType::Approve,
                requested: amount.value(),
                available: available.value(),
            });
        }

        let payment_id = graph.add_payment(Payment::new(instruction_id, amount))?;
        graph.instruction_mut().advance(InstructionState::InProgress)?;
        self.save(&mut graph).await?;
        info!(payment = %payment_id, "payment created");
        graph.payment(payment_id).cloned()
    }

    pub async fn approve(&self, payment_id: PaymentId, amount: Amount) -> Result<OperationResult> {
        self.execute(TransactionOwner::Payment(payment_id), TransactionType::Approve, amount)
            .await
    }

    pub async fn approve_and_deposit(
        &self,
        payment_id: PaymentId,
        amount: Amount,
    ) -> Result<OperationResult> {
        self.execute(
            TransactionOwner::Payment(payment_id),
            TransactionType::ApproveAndDeposit,
            amount,
        )
        .await
    }

    pub async fn deposit(&self, payment_id: PaymentId, amount: Amount) -> Result<OperationResult> {
        self.execute(TransactionOwner::Payment(payment_id), TransactionType::Deposit, amount)
            .await
    }

    pub async fn reverse_approval(
        &self,
        payment_id: PaymentId,
        amount: Amount,
    ) -> Result<OperationResult> {
        self.execute(
            TransactionOwner::Payment(payment_id),
            TransactionType::ReverseApproval,
            amount,
        )
        .await
    }

    pub async fn reverse_deposit(
        &self,
        payment_id: PaymentId,
        amount: Amount,
    ) -> Result<OperationResult> {
        self.execute(
            TransactionOwner::Payment(payment_id),
            TransactionType::ReverseDeposit,
            amount,
        )
        .await
    }

    pub async fn credit(&self, credit_id: CreditId, amount: Amount) -> Result<OperationResult> {
        self.execute(TransactionOwner::Credit(credit_id), TransactionType::Credit, amount)
            .await
    }

    pub async fn reverse_credit(&self, credit_id: CreditId, amount: Amount) -> Result<OperationResult> {
        self.execute(
            TransactionOwner::Credit(credit_id),
            TransactionType::ReverseCredit,
            amount,
        )
        .await
    }

    /// Creates a credit attached only to the instruction.
    #[instrument(skip(self))]
    pub async fn create_independent_credit(
        &self,
        instruction_id: InstructionId,
        amount: Amount,
    ) -> Result<Credit> {
        let _guard = self.locks.acquire(instruction_id).await;
        let mut graph = InstructionGraph::load(self.store.as_ref(), instruction_id).await?;
        graph.instruction().ensure_open()?;

        let credit_id = graph.add_credit(Credit::independent(instruction_id, amount))?;
        graph.instruction_mut().advance(InstructionState::InProgress)?;
        self.save(&mut graph).await?;
        info!(credit = %credit_id, "independent credit created");
        graph.credit(credit_id).cloned()
    }

    /// Creates a credit against money deposited on `payment_id`.
    #[instrument(skip(self))]
    pub async fn create_dependent_credit(
        &self,
        payment_id: PaymentId,
        amount: Amount,
    ) -> Result<Credit> {
        let instruction_id = self.store.load_payment(payment_id).await?.instruction_id;
        let _guard = self.locks.acquire(instruction_id).await;
        let mut graph = InstructionGraph::load(self.store.as_ref(), instruction_id).await?;
        graph.instruction().ensure_open()?;

        let payment = graph.payment(payment_id)?;
        let available = payment
            .headroom(TransactionType::Credit)
            .unwrap_or(Balance::ZERO)
            .floor_zero();
        if Balance::from(amount) > available {
            return Err(PaymentError::Overflow {
                target: payment.ledger_name(),
                transaction_type: TransactionType::Credit,
                requested: amount.value(),
                available: available.value(),
            });
        }

        let credit_id = graph.add_credit(Credit::dependent(instruction_id, payment_id, amount))?;
        self.save(&mut graph).await?;
        info!(credit = %credit_id, payment = %payment_id, "dependent credit created");
        graph.credit(credit_id).cloned()
    }

    /// Closes the instruction for good. Nothing under it may be pending.
    #[instrument(skip(self))]
    pub async fn close_payment_instruction(
        &self,
        instruction_id: InstructionId,
    ) -> Result<PaymentInstruction> {
        let _guard = self.locks.acquire(instruction_id).await;
        let mut graph = InstructionGraph::load(self.store.as_ref(), instruction_id).await?;
        graph.instruction().ensure_open()?;

        if let Some(pending) = graph.instruction_pending_transaction() {
            return Err(PaymentError::ConcurrentOperation {
                aggregate: AggregateKey::Instruction(instruction_id),
                transaction: pending.id,
            });
        }

        graph.instruction_mut().advance(InstructionState::Closed)?;
        self.save(&mut graph).await?;
        info!(instruction = %instruction_id, "payment instruction closed");
        Ok(graph.instruction().clone())
    }

    #[instrument(skip(self))]
    pub async fn set_payment_expiration(
        &self,
        payment_id: PaymentId,
        expiration_date: DateTime<Utc>,
    ) -> Result<Payment> {
        self.update_payment(payment_id, |payment| {
            payment.expiration_date = Some(expiration_date)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn expire_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.update_payment(payment_id, |payment| payment.set_expired(true))
            .await
    }

    async fn update_payment(
        &self,
        payment_id: PaymentId,
        update: impl FnOnce(&mut Payment) + Send,
    ) -> Result<Payment> {
        let instruction_id = self.store.load_payment(payment_id).await?.instruction_id;
        let _guard = self.locks.acquire(instruction_id).await;
        let mut graph = InstructionGraph::load(self.store.as_ref(), instruction_id).await?;
        graph.instruction().ensure_open()?;
        update(graph.payment_mut(payment_id)?);
        self.save(&mut graph).await?;
        graph.payment(payment_id).cloned()
    }

    async fn instruction_of(&self, owner: TransactionOwner) -> Result<InstructionId> {
        match owner {
            TransactionOwner::Payment(id) => Ok(self.store.load_payment(id).await?.instruction_id),
            TransactionOwner::Credit(id) => Ok(self.store.load_credit(id).await?.instruction_id),
        }
    }

    async fn refreshed_graph(&self, owner: TransactionOwner) -> Result<InstructionGraph> {
        let instruction_id = self.instruction_of(owner).await?;
        let _guard = self.locks.acquire(instruction_id).await;
        let mut graph = InstructionGraph::load(self.store.as_ref(), instruction_id).await?;
        self.reconcile(&mut graph, owner).await?;
        self.save(&mut graph).await?;
        Ok(graph)
    }

    /// The lifecycle template shared by every money-moving operation.
    #[instrument(skip(self), fields(instruction = tracing::field::Empty))]
    async fn execute(
        &self,
        owner: TransactionOwner,
        transaction_type: TransactionType,
        amount: Amount,
    ) -> Result<OperationResult> {
        let instruction_id = self.instruction_of(owner).await?;
        tracing::Span::current().record("instruction", tracing::field::display(instruction_id));

        let _guard = self.locks.acquire(instruction_id).await;
        let mut graph = InstructionGraph::load(self.store.as_ref(), instruction_id).await?;
        graph.instruction().ensure_open()?;

        // An earlier attempt may have been left pending; give the gateway a
        // chance to settle it before checking the guard.
        self.reconcile(&mut graph, owner).await?;
        self.save(&mut graph).await?;

        if let Some(pending) = graph.pending_transaction(owner) {
            return Err(PaymentError::ConcurrentOperation {
                aggregate: owner.into(),
                transaction: pending.id,
            });
        }
        Self::check_applicable(&graph, owner, transaction_type)?;
        let registered = self
            .plugins
            .resolve(&graph.instruction().payment_system_name)?
            .clone();

        for account in graph.ledger_accounts(owner)? {
            ledger::reserve(account, transaction_type, amount)?;
        }

        let transaction_id =
            graph.attach_transaction(owner, FinancialTransaction::new(transaction_type, amount))?;
        graph.instruction_mut().advance(InstructionState::InProgress)?;
        graph.transaction_mut(transaction_id)?.mark_pending()?;
        Self::settle_states(&mut graph, owner, None)?;
        debug!(transaction = %transaction_id, "dispatching to plugin");

        let dispatched = {
            let transaction = graph.transaction(transaction_id)?;
            let context = DispatchContext {
                instruction: graph.instruction(),
                extended_data: graph.extended_data_for(transaction_id)?,
            };
            tokio::time::timeout(
                self.config.dispatch_timeout,
                registered
                    .plugin
                    .execute(transaction_type, transaction, &context),
            )
            .await
        };

        match dispatched {
            Err(_) | Ok(Err(PluginError::Timeout)) => {
                // The gateway may have acted; keep the reservation and flag it.
                warn!(transaction = %transaction_id, "dispatch timed out, transaction left pending");
                graph.set_attention_required(owner, true)?;
                self.save(&mut graph).await?;
                Err(PaymentError::DispatchTimeout(transaction_id))
            }
            Ok(Err(PluginError::NotSupported)) => Err(PaymentError::UnsupportedOperation {
                payment_system: graph.instruction().payment_system_name.clone(),
                transaction_type,
            }),
            Ok(Err(PluginError::Gateway(message))) => {
                warn!(transaction = %transaction_id, %message, "plugin raised a hard error");
                Err(PaymentError::Plugin(message))
            }
            Ok(Ok(outcome)) => {
                let action = Self::apply_outcome(&mut graph, owner, transaction_id, outcome)?;
                self.save(&mut graph).await?;
                Self::result(&graph, owner, transaction_id, action)
            }
        }
    }

    fn check_applicable(
        graph: &InstructionGraph,
        owner: TransactionOwner,
        transaction_type: TransactionType,
    ) -> Result<()> {
        match owner {
            TransactionOwner::Payment(id) => {
                let payment = graph.payment(id)?;
                if transaction_type.is_credit_side() {
                    return Err(PaymentError::InvalidState(format!(
                        "{transaction_type} runs against a credit, not payment {id}"
                    )));
                }
                let collects = matches!(
                    transaction_type,
                    TransactionType::Approve
                        | TransactionType::ApproveAndDeposit
                        | TransactionType::Deposit
                );
                if collects && payment.is_expired() {
                    return Err(PaymentError::Expired(id));
                }
            }
            TransactionOwner::Credit(id) => {
                graph.credit(id)?;
                if !transaction_type.is_credit_side() {
                    return Err(PaymentError::InvalidState(format!(
                        "{transaction_type} runs against a payment, not credit {id}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Applies a plugin outcome to a pending transaction and the ledger.
    fn apply_outcome(
        graph: &mut InstructionGraph,
        owner: TransactionOwner,
        transaction_id: TransactionId,
        outcome: PluginOutcome,
    ) -> Result<Option<ActionRequest>> {
        let (transaction_type, requested) = {
            let transaction = graph.transaction(transaction_id)?;
            (transaction.transaction_type, transaction.requested_amount)
        };

        match outcome.state {
            OutcomeState::Success => {
                let mut processed = Balance::ZERO;
                for account in graph.ledger_accounts(owner)? {
                    processed = ledger::commit(
                        account,
                        transaction_type,
                        requested,
                        outcome.processed_amount,
                    )?;
                }
                graph
                    .transaction_mut(transaction_id)?
                    .succeed(processed, outcome.codes)?;
                graph.set_attention_required(owner, outcome.attention_required)?;
                Self::settle_states(graph, owner, None)?;
                if processed < Balance::from(requested) {
                    info!(transaction = %transaction_id, %processed, %requested, "partially settled");
                } else {
                    info!(transaction = %transaction_id, %processed, "settled");
                }
                Ok(None)
            }
            OutcomeState::Failed => {
                for account in graph.ledger_accounts(owner)? {
                    ledger::release(account, transaction_type, requested)?;
                }
                let reason = outcome.codes.reason_code.clone().unwrap_or_default();
                graph.transaction_mut(transaction_id)?.fail(outcome.codes)?;
                graph.set_attention_required(owner, outcome.attention_required)?;
                Self::settle_states(graph, owner, Some(transaction_type))?;
                info!(transaction = %transaction_id, %reason, "gateway declined");
                Ok(None)
            }
            OutcomeState::Pending => {
                graph
                    .transaction_mut(transaction_id)?
                    .note_pending(outcome.codes)?;
                if outcome.attention_required {
                    graph.set_attention_required(owner, true)?;
                }
                info!(transaction = %transaction_id, action = outcome.action.is_some(), "gateway left transaction pending");
                Ok(outcome.action)
            }
        }
    }

    fn settle_states(
        graph: &mut InstructionGraph,
        owner: TransactionOwner,
        failed: Option<TransactionType>,
    ) -> Result<()> {
        match owner {
            TransactionOwner::Payment(id) => {
                let payment = graph.payment_mut(id)?;
                match failed {
                    Some(TransactionType::Approve | TransactionType::ApproveAndDeposit) => {
                        payment.record_failed_approval()
                    }
                    _ => payment.settle_state(),
                }
            }
            TransactionOwner::Credit(id) => {
                let credit = graph.credit_mut(id)?;
                match failed {
                    Some(TransactionType::Credit) => credit.record_failed_credit(),
                    _ => credit.settle_state(),
                }
            }
        }
        Ok(())
    }

    /// Asks a queryable plugin about the owner's pending transaction and
    /// applies a final answer. Plugins without the capability are skipped.
    async fn reconcile(&self, graph: &mut InstructionGraph, owner: TransactionOwner) -> Result<()> {
        let Some(queryable) = self
            .plugins
            .resolve(&graph.instruction().payment_system_name)?
            .queryable
            .clone()
        else {
            return Ok(());
        };
        let Some(pending_id) = graph.pending_transaction(owner).map(|transaction| transaction.id)
        else {
            return Ok(());
        };

        let refreshed = {
            let transaction = graph.transaction(pending_id)?;
            let context = DispatchContext {
                instruction: graph.instruction(),
                extended_data: graph.extended_data_for(pending_id)?,
            };
            tokio::time::timeout(
                self.config.dispatch_timeout,
                queryable.refresh(transaction, &context),
            )
            .await
        };

        match refreshed {
            Ok(Ok(outcome)) if outcome.state != OutcomeState::Pending => {
                info!(transaction = %pending_id, state = ?outcome.state, "reconciled pending transaction");
                Self::apply_outcome(graph, owner, pending_id, outcome)?;
            }
            Ok(Ok(_)) => debug!(transaction = %pending_id, "gateway still pending"),
            Ok(Err(PluginError::NotSupported)) => {}
            Ok(Err(PluginError::Timeout)) | Err(_) => {
                warn!(transaction = %pending_id, "reconciliation query timed out")
            }
            Ok(Err(PluginError::Gateway(message))) => return Err(PaymentError::Plugin(message)),
        }
        Ok(())
    }

    fn result(
        graph: &InstructionGraph,
        owner: TransactionOwner,
        transaction_id: TransactionId,
        action: Option<ActionRequest>,
    ) -> Result<OperationResult> {
        let transaction = graph.transaction(transaction_id)?.clone();
        let (payment, credit) = match owner {
            TransactionOwner::Payment(id) => (Some(graph.payment(id)?.clone()), None),
            TransactionOwner::Credit(id) => {
                let credit = graph.credit(id)?.clone();
                let payment = match credit.payment_id {
                    Some(payment_id) => Some(graph.payment(payment_id)?.clone()),
                    None => None,
                };
                (payment, Some(credit))
            }
        };
        Ok(OperationResult {
            status: OperationResult::status_of(&transaction),
            transaction,
            instruction: graph.instruction().clone(),
            payment,
            credit,
            action,
        })
    }

    /// Saves everything the graph touched in one atomic write.
    async fn save(&self, graph: &mut InstructionGraph) -> Result<()> {
        if !graph.is_dirty() {
            return Ok(());
        }
        graph.touch(Utc::now());
        self.store.save_all(graph.take_dirty()).await
    }
}
