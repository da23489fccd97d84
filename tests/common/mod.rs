#![allow(dead_code)]

use async_trait::async_trait;
use payledger::application::controller::{ControllerConfig, PluginController};
use payledger::application::registry::PluginRegistry;
use payledger::domain::instruction::PaymentInstruction;
use payledger::domain::money::{Amount, Balance};
use payledger::domain::plugin::{
    DispatchContext, Plugin, PluginOutcome, PluginResult, QueryablePlugin,
};
use payledger::domain::transaction::{FinancialTransaction, TransactionType};
use payledger::infrastructure::in_memory::InMemoryPaymentStore;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const SCRIPTED: &str = "scripted";

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn balance(value: Decimal) -> Balance {
    Balance::new(value)
}

/// Gateway double answering from queues. With nothing queued it settles the
/// full amount on execute and stays pending on refresh.
#[derive(Default)]
pub struct ScriptedPlugin {
    outcomes: Mutex<VecDeque<PluginResult<PluginOutcome>>>,
    refreshes: Mutex<VecDeque<PluginResult<PluginOutcome>>>,
    stall: Mutex<Option<Duration>>,
    executed: AtomicUsize,
    refreshed: AtomicUsize,
}

impl ScriptedPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(&self, outcome: PluginResult<PluginOutcome>) -> &Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn then_refresh(&self, outcome: PluginResult<PluginOutcome>) -> &Self {
        self.refreshes.lock().unwrap().push_back(outcome);
        self
    }

    /// Makes the next executes sleep before answering.
    pub fn stall_for(&self, duration: Option<Duration>) {
        *self.stall.lock().unwrap() = duration;
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn refreshed(&self) -> usize {
        self.refreshed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    async fn execute(
        &self,
        _transaction_type: TransactionType,
        transaction: &FinancialTransaction,
        _context: &DispatchContext<'_>,
    ) -> PluginResult<PluginOutcome> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        let stall = *self.stall.lock().unwrap();
        if let Some(duration) = stall {
            tokio::time::sleep(duration).await;
        }
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(PluginOutcome::success(transaction.requested_amount.into())))
    }
}

#[async_trait]
impl QueryablePlugin for ScriptedPlugin {
    async fn refresh(
        &self,
        _transaction: &FinancialTransaction,
        _context: &DispatchContext<'_>,
    ) -> PluginResult<PluginOutcome> {
        self.refreshed.fetch_add(1, Ordering::SeqCst);
        let next = self.refreshes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(PluginOutcome::pending(None)))
    }
}

pub struct Harness {
    pub controller: PluginController,
    pub store: InMemoryPaymentStore,
    pub plugin: Arc<ScriptedPlugin>,
}

impl Harness {
    pub fn new(queryable: bool) -> Self {
        Self::with_timeout(queryable, Duration::from_secs(5))
    }

    pub fn with_timeout(queryable: bool, dispatch_timeout: Duration) -> Self {
        let plugin = Arc::new(ScriptedPlugin::new());
        let mut plugins = PluginRegistry::new();
        if queryable {
            plugins.register_queryable(SCRIPTED, plugin.clone());
        } else {
            plugins.register(SCRIPTED, plugin.clone());
        }
        let store = InMemoryPaymentStore::new();
        let controller = PluginController::new(
            Box::new(store.clone()),
            plugins,
            ControllerConfig { dispatch_timeout },
        );
        Self {
            controller,
            store,
            plugin,
        }
    }

    pub async fn instruction(&self, value: Decimal) -> PaymentInstruction {
        self.controller
            .create_payment_instruction(amount(value), "EUR", SCRIPTED, Default::default())
            .await
            .unwrap()
    }
}
