use crate::domain::ids::AggregateKey;
use crate::domain::ports::{Aggregate, PaymentStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for payment instructions.
pub const CF_INSTRUCTIONS: &str = "instructions";
/// Column Family for payments.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for credits.
pub const CF_CREDITS: &str = "credits";
/// Column Family for financial transactions.
pub const CF_TRANSACTIONS: &str = "transactions";

/// A persistent store implementation using RocksDB.
///
/// Each aggregate kind lives in its own Column Family, keyed by the 16 bytes
/// of its id and stored as JSON. `save_all` writes through a single
/// `WriteBatch`, so a unit of work lands completely or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_INSTRUCTIONS, CF_PAYMENTS, CF_CREDITS, CF_TRANSACTIONS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn column_family(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn location(key: AggregateKey) -> (&'static str, [u8; 16]) {
        match key {
            AggregateKey::Instruction(id) => (CF_INSTRUCTIONS, *id.as_bytes()),
            AggregateKey::Payment(id) => (CF_PAYMENTS, *id.as_bytes()),
            AggregateKey::Credit(id) => (CF_CREDITS, *id.as_bytes()),
            AggregateKey::Transaction(id) => (CF_TRANSACTIONS, *id.as_bytes()),
        }
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Deserialization error: {}", e),
            )))
        })
    }

    fn encode(aggregate: &Aggregate) -> Result<Vec<u8>> {
        let encoded = match aggregate {
            Aggregate::Instruction(instruction) => serde_json::to_vec(instruction),
            Aggregate::Payment(payment) => serde_json::to_vec(payment),
            Aggregate::Credit(credit) => serde_json::to_vec(credit),
            Aggregate::Transaction(transaction) => serde_json::to_vec(transaction),
        };
        encoded.map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn load(&self, key: AggregateKey) -> Result<Option<Aggregate>> {
        let (name, id) = Self::location(key);
        let cf = self.column_family(name)?;

        let Some(bytes) = self.db.get_pinned_cf(cf, id)? else {
            return Ok(None);
        };
        let aggregate = match key {
            AggregateKey::Instruction(_) => Aggregate::Instruction(Self::decode(&bytes)?),
            AggregateKey::Payment(_) => Aggregate::Payment(Self::decode(&bytes)?),
            AggregateKey::Credit(_) => Aggregate::Credit(Self::decode(&bytes)?),
            AggregateKey::Transaction(_) => Aggregate::Transaction(Self::decode(&bytes)?),
        };
        Ok(Some(aggregate))
    }

    async fn save_all(&self, aggregates: Vec<Aggregate>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for aggregate in &aggregates {
            let (name, id) = Self::location(aggregate.key());
            let cf = self.column_family(name)?;
            batch.put_cf(cf, id, Self::encode(aggregate)?);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instruction::PaymentInstruction;
    use crate::domain::money::Amount;
    use crate::domain::payment::Payment;
    use crate::domain::transaction::{FinancialTransaction, TransactionType};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_INSTRUCTIONS, CF_PAYMENTS, CF_CREDITS, CF_TRANSACTIONS] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_save_all_and_load() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let instruction = PaymentInstruction::new(
            Amount::new(dec!(100.00)).unwrap(),
            "EUR",
            "sandbox",
            [("locale", "de")].into_iter().collect(),
        );
        let payment = Payment::new(instruction.id, Amount::new(dec!(60.00)).unwrap());
        let transaction =
            FinancialTransaction::new(TransactionType::Approve, Amount::new(dec!(60.00)).unwrap());

        store
            .save_all(vec![
                Aggregate::Instruction(instruction.clone()),
                Aggregate::Payment(payment.clone()),
                Aggregate::Transaction(transaction.clone()),
            ])
            .await
            .unwrap();

        assert_eq!(store.load_instruction(instruction.id).await.unwrap(), instruction);
        assert_eq!(store.load_payment(payment.id).await.unwrap(), payment);
        assert_eq!(store.load_transaction(transaction.id).await.unwrap(), transaction);
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let instruction = PaymentInstruction::new(
            Amount::new(dec!(10.00)).unwrap(),
            "EUR",
            "sandbox",
            Default::default(),
        );

        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store
                .save_all(vec![Aggregate::Instruction(instruction.clone())])
                .await
                .unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.load_instruction(instruction.id).await.unwrap(), instruction);
        assert!(
            store
                .load(AggregateKey::Payment(Default::default()))
                .await
                .unwrap()
                .is_none()
        );
    }
}
