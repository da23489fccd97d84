use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Final standing of one aggregate created by a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub kind: &'static str,
    #[serde(rename = "ref")]
    pub alias: String,
    pub amount: Decimal,
    pub approved: Decimal,
    pub deposited: Decimal,
    pub credited: Decimal,
    pub state: String,
}

/// Writes summary rows as CSV with a header line.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes every row, trimming trailing zeros from the amounts.
    pub fn write_rows(&mut self, rows: impl IntoIterator<Item = SummaryRow>) -> Result<()> {
        for mut row in rows {
            row.amount = row.amount.normalize();
            row.approved = row.approved.normalize();
            row.deposited = row.deposited.normalize();
            row.credited = row.credited.normalize();
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
