use super::operation_reader::{OperationKind, OperationRecord};
use super::summary_writer::SummaryRow;
use crate::application::controller::PluginController;
use crate::application::result::{OperationResult, ResultStatus};
use crate::domain::extended_data::ExtendedData;
use crate::domain::ids::{CreditId, InstructionId, PaymentId};
use crate::domain::money::{Amount, Balance};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Created {
    Instruction(InstructionId),
    Payment(PaymentId),
    Credit(CreditId),
}

/// Runs operation rows against a controller, resolving script aliases to
/// the ids of the aggregates they created.
pub struct ScriptRunner<'a> {
    controller: &'a PluginController,
    default_currency: String,
    aliases: HashMap<String, Created>,
    created: Vec<(String, Created)>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(controller: &'a PluginController, default_currency: impl Into<String>) -> Self {
        Self {
            controller,
            default_currency: default_currency.into(),
            aliases: HashMap::new(),
            created: Vec::new(),
        }
    }

    pub async fn run(&mut self, record: OperationRecord) -> Result<()> {
        let controller = self.controller;
        match record.op {
            OperationKind::Instruction => {
                let alias = self.claim(&record)?;
                let amount = required_amount(&record)?;
                let currency = record
                    .currency
                    .clone()
                    .unwrap_or_else(|| self.default_currency.clone());
                let instruction = controller
                    .create_payment_instruction(
                        amount,
                        &currency,
                        &record.target,
                        ExtendedData::default(),
                    )
                    .await?;
                self.remember(alias, Created::Instruction(instruction.id));
                Ok(())
            }
            OperationKind::Payment => {
                let alias = self.claim(&record)?;
                let instruction = self.instruction(&record.target)?;
                let payment = controller
                    .create_payment(instruction, required_amount(&record)?)
                    .await?;
                self.remember(alias, Created::Payment(payment.id));
                Ok(())
            }
            OperationKind::IndependentCredit => {
                let alias = self.claim(&record)?;
                let instruction = self.instruction(&record.target)?;
                let credit = controller
                    .create_independent_credit(instruction, required_amount(&record)?)
                    .await?;
                self.remember(alias, Created::Credit(credit.id));
                Ok(())
            }
            OperationKind::DependentCredit => {
                let alias = self.claim(&record)?;
                let payment = self.payment(&record.target)?;
                let credit = controller
                    .create_dependent_credit(payment, required_amount(&record)?)
                    .await?;
                self.remember(alias, Created::Credit(credit.id));
                Ok(())
            }
            OperationKind::Close => {
                let instruction = self.instruction(&record.target)?;
                controller.close_payment_instruction(instruction).await?;
                Ok(())
            }
            OperationKind::Approve => {
                let result = controller
                    .approve(self.payment(&record.target)?, required_amount(&record)?)
                    .await?;
                report(&record, &result);
                Ok(())
            }
            OperationKind::ApproveAndDeposit => {
                let result = controller
                    .approve_and_deposit(self.payment(&record.target)?, required_amount(&record)?)
                    .await?;
                report(&record, &result);
                Ok(())
            }
            OperationKind::Deposit => {
                let result = controller
                    .deposit(self.payment(&record.target)?, required_amount(&record)?)
                    .await?;
                report(&record, &result);
                Ok(())
            }
            OperationKind::ReverseApproval => {
                let result = controller
                    .reverse_approval(self.payment(&record.target)?, required_amount(&record)?)
                    .await?;
                report(&record, &result);
                Ok(())
            }
            OperationKind::ReverseDeposit => {
                let result = controller
                    .reverse_deposit(self.payment(&record.target)?, required_amount(&record)?)
                    .await?;
                report(&record, &result);
                Ok(())
            }
            OperationKind::Credit => {
                let result = controller
                    .credit(self.credit(&record.target)?, required_amount(&record)?)
                    .await?;
                report(&record, &result);
                Ok(())
            }
            OperationKind::ReverseCredit => {
                let result = controller
                    .reverse_credit(self.credit(&record.target)?, required_amount(&record)?)
                    .await?;
                report(&record, &result);
                Ok(())
            }
        }
    }

    /// Current standing of every created aggregate, in creation order.
    pub async fn summary(&self) -> Result<Vec<SummaryRow>> {
        let mut rows = Vec::with_capacity(self.created.len());
        for (alias, created) in &self.created {
            let row = match *created {
                Created::Instruction(id) => {
                    let instruction = self.controller.get_payment_instruction(id).await?;
                    SummaryRow {
                        kind: "instruction",
                        alias: alias.clone(),
                        amount: instruction.amount.value(),
                        approved: instruction.approved_amount.value(),
                        deposited: instruction.deposited_amount.value(),
                        credited: instruction.credited_amount.value(),
                        state: instruction.state().to_string(),
                    }
                }
                Created::Payment(id) => {
                    let payment = self.controller.get_payment(id).await?;
                    SummaryRow {
                        kind: "payment",
                        alias: alias.clone(),
                        amount: payment.target_amount.value(),
                        approved: payment.approved_amount.value(),
                        deposited: payment.deposited_amount.value(),
                        credited: payment.credited_amount.value(),
                        state: payment.effective_state().to_string(),
                    }
                }
                Created::Credit(id) => {
                    let credit = self.controller.get_credit(id).await?;
                    SummaryRow {
                        kind: "credit",
                        alias: alias.clone(),
                        amount: credit.target_amount.value(),
                        approved: Decimal::ZERO,
                        deposited: Decimal::ZERO,
                        credited: credit.credited_amount.value(),
                        state: credit.state.to_string(),
                    }
                }
            };
            rows.push(row);
        }
        Ok(rows)
    }

    /// Checks the row names a fresh ref before anything is created.
    fn claim(&self, record: &OperationRecord) -> Result<String> {
        let alias = record.alias.clone().ok_or_else(|| {
            PaymentError::ValidationError(format!("`{:?}` rows need a ref", record.op))
        })?;
        if self.aliases.contains_key(&alias) {
            return Err(PaymentError::ValidationError(format!(
                "ref `{alias}` is already taken"
            )));
        }
        Ok(alias)
    }

    fn remember(&mut self, alias: String, created: Created) {
        self.aliases.insert(alias.clone(), created);
        self.created.push((alias, created));
    }

    fn resolve(&self, alias: &str) -> Result<Created> {
        self.aliases
            .get(alias)
            .copied()
            .ok_or_else(|| PaymentError::ValidationError(format!("unknown ref `{alias}`")))
    }

    fn instruction(&self, alias: &str) -> Result<InstructionId> {
        match self.resolve(alias)? {
            Created::Instruction(id) => Ok(id),
            _ => Err(PaymentError::ValidationError(format!(
                "ref `{alias}` is not a payment instruction"
            ))),
        }
    }

    fn payment(&self, alias: &str) -> Result<PaymentId> {
        match self.resolve(alias)? {
            Created::Payment(id) => Ok(id),
            _ => Err(PaymentError::ValidationError(format!(
                "ref `{alias}` is not a payment"
            ))),
        }
    }

    fn credit(&self, alias: &str) -> Result<CreditId> {
        match self.resolve(alias)? {
            Created::Credit(id) => Ok(id),
            _ => Err(PaymentError::ValidationError(format!(
                "ref `{alias}` is not a credit"
            ))),
        }
    }
}

fn required_amount(record: &OperationRecord) -> Result<Amount> {
    record.amount.ok_or_else(|| {
        PaymentError::ValidationError(format!("`{:?}` rows need an amount", record.op))
    })
}

fn report(record: &OperationRecord, result: &OperationResult) {
    let processed: Balance = result.transaction.processed_amount();
    match result.status {
        ResultStatus::Success => {
            info!(op = ?record.op, target = %record.target, %processed, "operation settled")
        }
        ResultStatus::Failed => warn!(
            op = ?record.op,
            target = %record.target,
            reason = result.reason_code().unwrap_or("unknown"),
            "gateway declined operation"
        ),
        ResultStatus::Pending => {
            info!(op = ?record.op, target = %record.target, "operation pending at gateway")
        }
    }
}
