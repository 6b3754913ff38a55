//! html2csv - Extract transactions from giro account statements as CSV rows.
//!
//! Reads statement documents converted with `pdftohtml` (or statement PDFs directly)
//! and prints one CSV row per transaction to stdout.

mod config;
mod extract;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::config::Config;
use crate::extract::html2csv;

/// Command line arguments for html2csv.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Extract transactions from giro account statements as CSV rows"
)]
pub struct Html2CsvArgs {
    /// Statement HTML documents or PDF files
    #[arg(value_hint = clap::ValueHint::FilePath, required_unless_present = "SHELL")]
    pub paths: Vec<PathBuf>,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    pub completion: Option<Shell>,

    /// Print verbose output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> Result<()> {
    let args = Html2CsvArgs::parse();
    if let Some(ref shell) = args.completion {
        kontoauszug_tools::generate_shell_completion(*shell, Html2CsvArgs::command(), true, env!("CARGO_BIN_NAME"))
    } else {
        let config = Config::from_args(&args)?;
        html2csv(&config)
    }
}
