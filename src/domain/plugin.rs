//! Gateway plugin contract.
//!
//! A plugin executes one financial transaction against an external payment
//! system and reports what happened. The controller never talks to a gateway
//! directly.

use super::extended_data::ExtendedData;
use super::instruction::PaymentInstruction;
use super::money::Balance;
use super::transaction::{FinancialTransaction, GatewayCodes, TransactionType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Something the caller has to do before the gateway can finish, e.g. send
/// the payer to a 3-D Secure page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionRequest {
    Redirect { url: String },
    Respond { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    Success,
    Failed,
    /// Accepted by the gateway but not final yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginOutcome {
    pub state: OutcomeState,
    pub processed_amount: Balance,
    pub codes: GatewayCodes,
    pub action: Option<ActionRequest>,
    /// The plugin could not tell for sure what the gateway did.
    pub attention_required: bool,
}

impl PluginOutcome {
    pub fn success(processed_amount: Balance) -> Self {
        Self {
            state: OutcomeState::Success,
            processed_amount,
            codes: GatewayCodes::default(),
            action: None,
            attention_required: false,
        }
    }

    pub fn failed(reason_code: impl Into<String>) -> Self {
        Self {
            state: OutcomeState::Failed,
            processed_amount: Balance::ZERO,
            codes: GatewayCodes {
                reason_code: Some(reason_code.into()),
                ..Default::default()
            },
            action: None,
            attention_required: false,
        }
    }

    pub fn pending(action: Option<ActionRequest>) -> Self {
        Self {
            state: OutcomeState::Pending,
            processed_amount: Balance::ZERO,
            codes: GatewayCodes::default(),
            action,
            attention_required: false,
        }
    }

    pub fn with_response_code(mut self, code: impl Into<String>) -> Self {
        self.codes.response_code = Some(code.into());
        self
    }

    pub fn with_reference_number(mut self, reference: impl Into<String>) -> Self {
        self.codes.reference_number = Some(reference.into());
        self
    }

    pub fn with_tracking_id(mut self, tracking_id: impl Into<String>) -> Self {
        self.codes.tracking_id = Some(tracking_id.into());
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// The plugin cannot perform this kind of transaction at all.
    #[error("function not supported by plugin")]
    NotSupported,
    /// The gateway did not answer in time; its side effect is unknown.
    #[error("gateway timed out")]
    Timeout,
    #[error("gateway error: {0}")]
    Gateway(String),
}

pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Read-only view the plugin gets alongside the transaction.
pub struct DispatchContext<'a> {
    pub instruction: &'a PaymentInstruction,
    /// The transaction's own extended data, or the instruction's.
    pub extended_data: &'a ExtendedData,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    async fn execute(
        &self,
        transaction_type: TransactionType,
        transaction: &FinancialTransaction,
        context: &DispatchContext<'_>,
    ) -> PluginResult<PluginOutcome>;
}

/// Optional capability: the gateway can be asked for the current status of
/// a transaction it was sent earlier.
#[async_trait]
pub trait QueryablePlugin: Plugin {
    async fn refresh(
        &self,
        transaction: &FinancialTransaction,
        context: &DispatchContext<'_>,
    ) -> PluginResult<PluginOutcome>;
}
