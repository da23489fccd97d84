use crate::domain::money::Amount;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Instruction,
    Payment,
    Approve,
    ApproveAndDeposit,
    Deposit,
    ReverseApproval,
    ReverseDeposit,
    IndependentCredit,
    DependentCredit,
    Credit,
    ReverseCredit,
    Close,
}

/// One row of an operation script.
///
/// `alias` names the aggregate a row creates so later rows can refer to it
/// through `target`. For `instruction` rows `target` is the payment system.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OperationRecord {
    pub op: OperationKind,
    #[serde(rename = "ref", default)]
    pub alias: Option<String>,
    pub target: String,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Reads operation rows from a CSV source.
///
/// Whitespace is trimmed and trailing optional columns may be left out.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    /// Creates a new `OperationReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes rows; a bad row does not stop the stream.
    pub fn operations(self) -> impl Iterator<Item = Result<OperationRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "op, ref, target, amount, currency\n\
                    instruction, order, sandbox, 100.00, USD\n\
                    payment, p1, order, 60.00,\n\
                    close, , order,";
        let reader = OperationReader::new(data.as_bytes());
        let results: Vec<Result<OperationRecord>> = reader.operations().collect();

        assert_eq!(results.len(), 3);
        let instruction = results[0].as_ref().unwrap();
        assert_eq!(instruction.op, OperationKind::Instruction);
        assert_eq!(instruction.alias.as_deref(), Some("order"));
        assert_eq!(instruction.target, "sandbox");
        assert_eq!(instruction.amount, Some(Amount::new(dec!(100.00)).unwrap()));
        assert_eq!(instruction.currency.as_deref(), Some("USD"));

        let payment = results[1].as_ref().unwrap();
        assert!(payment.currency.is_none());

        let close = results[2].as_ref().unwrap();
        assert_eq!(close.op, OperationKind::Close);
        assert!(close.alias.is_none());
        assert!(close.amount.is_none());
    }

    #[test]
    fn test_reader_rejects_unknown_op() {
        let data = "op, ref, target, amount\nrefund, r1, p1, 1.0";
        let reader = OperationReader::new(data.as_bytes());
        let results: Vec<Result<OperationRecord>> = reader.operations().collect();

        assert!(matches!(results[0], Err(PaymentError::CsvError(_))));
    }

    #[test]
    fn test_reader_rejects_non_positive_amount() {
        let data = "op, ref, target, amount\napprove, , p1, -5.00";
        let reader = OperationReader::new(data.as_bytes());
        let results: Vec<Result<OperationRecord>> = reader.operations().collect();

        assert!(results[0].is_err());
    }
}
