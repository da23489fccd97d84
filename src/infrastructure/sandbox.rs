use crate::domain::money::Balance;
use crate::domain::plugin::{
    DispatchContext, Plugin, PluginOutcome, PluginResult, QueryablePlugin,
};
use crate::domain::transaction::{FinancialTransaction, TransactionType};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a [`SandboxPlugin`] answers every transaction it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBehaviour {
    /// Processes the full requested amount.
    Settle,
    /// Declines with reason code `declined`.
    Decline,
    /// Processes half of the requested amount, rounded to cents.
    SettleHalf,
}

/// An offline gateway used by the CLI and the tests.
///
/// Every answer carries a sequential `SBX-` reference number.
#[derive(Debug)]
pub struct SandboxPlugin {
    behaviour: SandboxBehaviour,
    sequence: AtomicU64,
}

impl SandboxPlugin {
    pub fn new(behaviour: SandboxBehaviour) -> Self {
        Self {
            behaviour,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_reference(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("SBX-{n:06}")
    }

    fn answer(&self, transaction: &FinancialTransaction) -> PluginOutcome {
        let requested = transaction.requested_amount.value();
        let outcome = match self.behaviour {
            SandboxBehaviour::Settle => PluginOutcome::success(Balance::new(requested)),
            SandboxBehaviour::Decline => PluginOutcome::failed("declined").with_response_code("05"),
            SandboxBehaviour::SettleHalf => {
                PluginOutcome::success(Balance::new((requested / Decimal::TWO).round_dp(2)))
            }
        };
        outcome.with_reference_number(self.next_reference())
    }
}

#[async_trait]
impl Plugin for SandboxPlugin {
    async fn execute(
        &self,
        transaction_type: TransactionType,
        transaction: &FinancialTransaction,
        context: &DispatchContext<'_>,
    ) -> PluginResult<PluginOutcome> {
        tracing::debug!(
            %transaction_type,
            instruction = %context.instruction.id,
            amount = %transaction.requested_amount,
            "sandbox gateway call"
        );
        Ok(self.answer(transaction))
    }
}

#[async_trait]
impl QueryablePlugin for SandboxPlugin {
    async fn refresh(
        &self,
        transaction: &FinancialTransaction,
        _context: &DispatchContext<'_>,
    ) -> PluginResult<PluginOutcome> {
        Ok(self.answer(transaction))
    }
}
