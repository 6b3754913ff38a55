use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use tempfile::TempDir;

use kontoauszug_tools::command::{DocumentConverter, PdfToHtml};
use kontoauszug_tools::statement::{Statement, Transaction, write_csv};

use crate::config::Config;

/// Parse all input documents and print their transactions as CSV rows to stdout.
///
/// Nothing is written to stdout unless every document parses and its balances add up.
/// Diagnostics go to stderr so stdout stays pure CSV.
///
/// # Errors
/// Returns an error if any input cannot be converted, parsed or balance-checked.
pub fn html2csv(config: &Config) -> Result<()> {
    let converter = PdfToHtml::new();
    let mut scratch: Option<TempDir> = None;
    let mut transactions: Vec<Transaction> = Vec::new();

    for input in &config.inputs {
        let document = if is_pdf(input) {
            if scratch.is_none() {
                converter.check_available()?;
                scratch = Some(create_scratch_dir()?);
            }
            let dir = scratch.as_ref().map(TempDir::path).context("Scratch directory missing")?;
            convert_pdf(&converter, input, dir)?
        } else {
            input.clone()
        };

        let statement = Statement::from_file(&document)?;
        let (old_balance, new_balance) = (statement.old_balance, statement.new_balance);
        let resolved = statement
            .resolve_balances()
            .with_context(|| format!("Balance check failed for {}", input.display()))?;

        if config.verbose {
            eprintln!(
                "{}: {} {} -> {} ({})",
                kontoauszug_tools::path_to_filename_string(input),
                "balance".bold(),
                old_balance,
                new_balance,
                format!("{}", resolved.len()).cyan()
            );
            for transaction in &resolved {
                eprintln!("  {transaction}");
            }
        }
        transactions.extend(resolved);
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let count = write_csv(&mut handle, &transactions)?;
    handle.flush().context("Failed to flush stdout")?;

    if config.verbose {
        eprintln!("{}", format!("Rows written: {count}").green());
    }
    Ok(())
}

/// Statement PDFs are recognized from their file extension.
fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
}

fn create_scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("html2csv_")
        .tempdir()
        .context("Failed to create scratch directory")
}

/// Copy the PDF into the scratch directory and convert the copy.
fn convert_pdf(converter: &impl DocumentConverter, input: &Path, scratch: &Path) -> Result<PathBuf> {
    let file_name = input
        .file_name()
        .with_context(|| format!("Input has no file name: {}", input.display()))?;
    let copy = scratch.join(file_name);
    fs::copy(input, &copy).with_context(|| format!("Failed to copy {} to scratch directory", input.display()))?;
    converter
        .convert(&copy)
        .with_context(|| format!("Failed to convert {}", input.display()))
}
