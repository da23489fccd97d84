use crate::domain::plugin::{Plugin, QueryablePlugin};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// A plugin together with the capabilities detected when it was registered.
#[derive(Clone)]
pub struct RegisteredPlugin {
    pub plugin: Arc<dyn Plugin>,
    pub queryable: Option<Arc<dyn QueryablePlugin>>,
}

/// Resolves payment-system names to plugins.
///
/// Capabilities are fixed at registration; dispatch never inspects a plugin's
/// type at call time.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Plugin + 'static>(&mut self, payment_system: impl Into<String>, plugin: Arc<P>) {
        self.plugins.insert(
            payment_system.into(),
            RegisteredPlugin {
                plugin,
                queryable: None,
            },
        );
    }

    pub fn register_queryable<P: QueryablePlugin + 'static>(
        &mut self,
        payment_system: impl Into<String>,
        plugin: Arc<P>,
    ) {
        self.plugins.insert(
            payment_system.into(),
            RegisteredPlugin {
                plugin: plugin.clone(),
                queryable: Some(plugin as Arc<dyn QueryablePlugin>),
            },
        );
    }

    pub fn contains(&self, payment_system: &str) -> bool {
        self.plugins.contains_key(payment_system)
    }

    pub fn resolve(&self, payment_system: &str) -> Result<&RegisteredPlugin> {
        self.plugins
            .get(payment_system)
            .ok_or_else(|| PaymentError::PluginNotFound(payment_system.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plugin::{DispatchContext, PluginOutcome, PluginResult};
    use crate::domain::transaction::{FinancialTransaction, TransactionType};
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl Plugin for Silent {
        async fn execute(
            &self,
            _transaction_type: TransactionType,
            _transaction: &FinancialTransaction,
            _context: &DispatchContext<'_>,
        ) -> PluginResult<PluginOutcome> {
            Ok(PluginOutcome::pending(None))
        }
    }

    #[async_trait]
    impl QueryablePlugin for Silent {
        async fn refresh(
            &self,
            _transaction: &FinancialTransaction,
            _context: &DispatchContext<'_>,
        ) -> PluginResult<PluginOutcome> {
            Ok(PluginOutcome::pending(None))
        }
    }

    #[test]
    fn test_capability_fixed_at_registration() {
        let mut registry = PluginRegistry::new();
        registry.register("plain", Arc::new(Silent));
        registry.register_queryable("queryable", Arc::new(Silent));

        assert!(registry.resolve("plain").unwrap().queryable.is_none());
        assert!(registry.resolve("queryable").unwrap().queryable.is_some());
    }

    #[test]
    fn test_unknown_payment_system() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.resolve("paypal"),
            Err(PaymentError::PluginNotFound(name)) if name == "paypal"
        ));
    }
}
