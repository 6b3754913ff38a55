//! Giro account statement parsing.
//!
//! Reads the HTML documents `pdftohtml` produces from bank statement PDFs,
//! extracts the booked transactions, checks them against the statement balances
//! and writes them as CSV rows.

mod amount;
mod html;
mod output;
mod parse;
mod transaction;

use std::path::Path;

use anyhow::{Context, Result};

pub use amount::Amount;
pub use html::{decode_document, html_to_text, read_document, unescape_html};
pub use output::write_csv;
pub use parse::parse_statement;
pub use transaction::{BANK_PARTNER, Transaction, display_kind, is_internal_kind};

/// Transactions of one statement together with its opening and closing balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Balance at the start of the statement period (Alter Saldo).
    pub old_balance: Amount,
    /// Balance at the end of the statement period (Neuer Saldo).
    pub new_balance: Amount,
    pub transactions: Vec<Transaction>,
}

impl Statement {
    /// Read and parse a statement document from file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = read_document(path)?;
        parse_statement(&content).with_context(|| format!("Failed to parse statement: {}", path.display()))
    }

    /// Sum of all transaction amounts.
    #[must_use]
    pub fn total(&self) -> Amount {
        self.transactions.iter().map(|t| t.amount).sum()
    }

    /// Fill in the running balance for each transaction.
    ///
    /// # Errors
    /// Returns an error if the transactions do not add up to the new balance,
    /// which means some entries were not extracted.
    pub fn resolve_balances(self) -> Result<Vec<Transaction>> {
        let mut balance = self.old_balance;
        let mut transactions = self.transactions;
        for transaction in &mut transactions {
            transaction.old_balance = Some(balance);
            balance += transaction.amount;
            transaction.new_balance = Some(balance);
        }

        if balance != self.new_balance {
            anyhow::bail!(
                "Expected new balance is {}, calculated balance is {balance}. It seems that not all entries were extracted.",
                self.new_balance
            );
        }
        Ok(transactions)
    }
}
