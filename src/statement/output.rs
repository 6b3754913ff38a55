use std::io::Write;

use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};

use crate::statement::Transaction;

/// Record columns holding amounts. All other columns are text.
const AMOUNT_COLUMNS: [usize; 3] = [5, 6, 7];

/// Write transactions as CSV rows without a header line.
///
/// Text fields are always quoted, even when they look like numbers,
/// and amounts are written as is,
/// so that rows from several statements can be concatenated.
/// Returns the number of rows written.
///
/// # Errors
/// Returns an error if writing fails.
pub fn write_csv<W: Write>(writer: W, transactions: &[Transaction]) -> Result<usize> {
    // Quoting is decided per column below, the writer passes fields through
    let mut csv_writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .from_writer(writer);

    for transaction in transactions {
        let record = transaction.to_record();
        let fields = record.iter().enumerate().map(|(column, field)| {
            if AMOUNT_COLUMNS.contains(&column) {
                field.clone()
            } else {
                quote_text(field)
            }
        });
        csv_writer
            .write_record(fields)
            .with_context(|| format!("Failed to write CSV row: {transaction}"))?;
    }
    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(transactions.len())
}

/// Wrap a text field in double quotes, doubling any embedded quote.
fn quote_text(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}
