//! Opaque identifiers for the stored aggregates.
//!
//! Aggregates never hold references to each other, only these ids. The
//! [`InstructionGraph`](super::graph::InstructionGraph) resolves them against
//! the entities loaded for one instruction.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(
    /// Identifies a [`PaymentInstruction`](super::instruction::PaymentInstruction).
    InstructionId
);
opaque_id!(
    /// Identifies a [`Payment`](super::payment::Payment).
    PaymentId
);
opaque_id!(
    /// Identifies a [`Credit`](super::credit::Credit).
    CreditId
);
opaque_id!(
    /// Identifies a [`FinancialTransaction`](super::transaction::FinancialTransaction).
    TransactionId
);

/// Names one stored aggregate by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AggregateKey {
    Instruction(InstructionId),
    Payment(PaymentId),
    Credit(CreditId),
    Transaction(TransactionId),
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateKey::Instruction(id) => write!(f, "payment instruction {id}"),
            AggregateKey::Payment(id) => write!(f, "payment {id}"),
            AggregateKey::Credit(id) => write!(f, "credit {id}"),
            AggregateKey::Transaction(id) => write!(f, "financial transaction {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(PaymentId::new(), PaymentId::new());
    }

    #[test]
    fn test_aggregate_key_display() {
        let id = Uuid::nil();
        let key = AggregateKey::Credit(CreditId::from(id));
        assert_eq!(key.to_string(), format!("credit {id}"));
    }
}
