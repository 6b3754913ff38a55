use std::time::Duration;

use colored::Colorize;

/// Statistics for one batch run
#[derive(Debug, Default)]
pub struct RunStats {
    pub(crate) files_found: usize,
    pub(crate) files_converted: usize,
    pub(crate) files_failed: usize,
    pub(crate) rows_written: usize,
    pub(crate) aborted: bool,
    pub(crate) total_duration: Duration,
}

impl RunStats {
    pub(crate) const fn add_converted(&mut self, rows: usize) {
        self.files_converted += 1;
        self.rows_written += rows;
    }

    pub(crate) const fn add_failed(&mut self) {
        self.files_failed += 1;
    }

    /// Files that were neither converted nor failed because the run was interrupted.
    pub(crate) const fn files_remaining(&self) -> usize {
        self.files_found
            .saturating_sub(self.files_converted)
            .saturating_sub(self.files_failed)
    }

    pub(crate) fn print_summary(&self) {
        println!("{}", "\n--- Conversion Summary ---".bold().magenta());
        println!("Files found:            {}", self.files_found);
        println!("Files converted:        {}", self.files_converted);
        println!(
            "Files failed:           {}",
            if self.files_failed > 0 {
                self.files_failed.to_string().red()
            } else {
                "0".normal()
            }
        );
        if self.aborted {
            println!("Files not processed:    {}", self.files_remaining().to_string().yellow());
        }
        println!("Rows written:           {}", self.rows_written.to_string().cyan());
        println!(
            "Total time:             {}",
            kontoauszug_tools::format_duration(self.total_duration)
        );
    }
}
