//! kontoauszug - Convert giro account statement PDFs into one CSV file of transactions.
//!
//! Finds `Girokonto_*_Kontoauszug_*.pdf` files in the given directory,
//! converts each with `pdftohtml`, extracts the rows with `html2csv`
//! and appends them to `transactions.csv`.

mod batch;
mod config;
mod stats;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::batch::BatchConverter;

/// Command line arguments for kontoauszug.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Convert giro account statement PDFs into one CSV file of transactions"
)]
pub struct KontoauszugArgs {
    /// Optional directory containing the statement PDFs
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub path: Option<PathBuf>,

    /// Only print the files and commands, do not convert anything
    #[arg(short, long)]
    pub print: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    pub completion: Option<Shell>,

    /// Print verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> Result<()> {
    let args = KontoauszugArgs::parse();
    if let Some(ref shell) = args.completion {
        kontoauszug_tools::generate_shell_completion(*shell, KontoauszugArgs::command(), true, env!("CARGO_BIN_NAME"))
    } else {
        BatchConverter::new(&args)?.run()
    }
}
