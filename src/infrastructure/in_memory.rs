use crate::domain::ids::AggregateKey;
use crate::domain::ports::{Aggregate, PaymentStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for every aggregate kind.
///
/// Uses `Arc<RwLock<HashMap<AggregateKey, Aggregate>>>` so clones share the
/// same data. A `save_all` call holds the write lock for the whole batch,
/// which makes it atomic for readers.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    aggregates: Arc<RwLock<HashMap<AggregateKey, Aggregate>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.aggregates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.aggregates.read().await.is_empty()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn load(&self, key: AggregateKey) -> Result<Option<Aggregate>> {
        let aggregates = self.aggregates.read().await;
        Ok(aggregates.get(&key).cloned())
    }

    async fn save_all(&self, batch: Vec<Aggregate>) -> Result<()> {
        let mut aggregates = self.aggregates.write().await;
        for aggregate in batch {
            aggregates.insert(aggregate.key(), aggregate);
        }
        Ok(())
    }
}
