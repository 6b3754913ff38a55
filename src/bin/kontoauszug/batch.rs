use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use regex::bytes::Regex;
use tempfile::TempDir;

use kontoauszug_tools::command::{DocumentConverter, PdfToHtml, ProcessExtractor, RowExtractor};
use kontoauszug_tools::{print_error, print_warning};

use crate::KontoauszugArgs;
use crate::config::Config;
use crate::stats::RunStats;

/// Name of the row extractor program installed next to this binary.
const EXTRACTOR_NAME: &str = "html2csv";

/// Name prefix of the per-run scratch directory.
const SCRATCH_PREFIX: &str = "kontoauszug_";

// Matches raw file name bytes, so names that are not valid Unicode are found too
static RE_STATEMENT_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s-u)^Girokonto_.*_Kontoauszug_.*\.pdf$").expect("Failed to create regex pattern for statement file")
});

/// Ctrl+C state shared with the signal handler.
///
/// The first interrupt requests a stop after the current file.
/// The scratch directory of the running batch is registered here
/// so that a forced exit can still remove it.
#[derive(Debug, Default)]
pub struct Interrupt {
    requested: AtomicBool,
    scratch: Mutex<Option<PathBuf>>,
}

impl Interrupt {
    /// Record an interrupt. Returns true if one was already requested before.
    pub(crate) fn request(&self) -> bool {
        self.requested.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn register_scratch(&self, path: Option<PathBuf>) {
        if let Ok(mut scratch) = self.scratch.lock() {
            *scratch = path;
        }
    }

    /// Remove the registered scratch directory before a forced exit.
    pub(crate) fn remove_scratch(&self) {
        if let Ok(mut scratch) = self.scratch.lock()
            && let Some(path) = scratch.take()
        {
            let _ = fs::remove_dir_all(path);
        }
    }
}

/// Converts all statement PDFs in one directory into a single CSV file.
pub struct BatchConverter<C: DocumentConverter, E: RowExtractor> {
    config: Config,
    converter: C,
    extractor: E,
}

impl BatchConverter<PdfToHtml, ProcessExtractor> {
    /// Create a batch converter using `pdftohtml` and the `html2csv` helper.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or a required program cannot be started.
    pub fn new(args: &KontoauszugArgs) -> Result<Self> {
        let config = Config::from_args(args)?;
        let converter = PdfToHtml::new();
        let extractor = ProcessExtractor::new(kontoauszug_tools::sibling_executable(EXTRACTOR_NAME));

        if config.verbose {
            println!("Base directory: {}", config.root.display());
            println!("Row extractor:  {}", extractor.program().display());
        }

        // Nothing gets deleted or converted in a dry run
        if !config.dryrun {
            converter.check_available()?;
            extractor.check_available()?;
        }

        Ok(Self::with_commands(config, converter, extractor))
    }
}

impl<C: DocumentConverter, E: RowExtractor> BatchConverter<C, E> {
    pub const fn with_commands(config: Config, converter: C, extractor: E) -> Self {
        Self {
            config,
            converter,
            extractor,
        }
    }

    /// Run the batch conversion.
    ///
    /// # Errors
    /// Returns an error on a fatal failure, or after the loop if any file failed.
    pub fn run(&self) -> Result<()> {
        // Set up Ctrl+C handler for graceful abort
        let interrupt = Arc::new(Interrupt::default());
        let interrupt_handler = Arc::clone(&interrupt);

        ctrlc::set_handler(move || {
            if interrupt_handler.request() {
                // Second Ctrl+C - force exit, skips the scratch directory drop
                interrupt_handler.remove_scratch();
                std::process::exit(130);
            }
            println!("\n{}", "Received Ctrl+C, finishing current file...".yellow().bold());
        })
        .context("Failed to set Ctrl+C handler")?;

        let stats = self.convert_all(&interrupt)?;
        if self.config.dryrun {
            return Ok(());
        }

        if stats.aborted {
            println!("\n{}", "Aborted by user".bold().red());
        }
        stats.print_summary();

        if stats.files_failed > 0 {
            anyhow::bail!(
                "{} of {} statement file(s) failed to convert",
                stats.files_failed,
                stats.files_found
            );
        }
        Ok(())
    }

    /// Convert every statement file and append its rows to the output file.
    ///
    /// The interrupt is checked before each file.
    pub(crate) fn convert_all(&self, interrupt: &Interrupt) -> Result<RunStats> {
        let start = Instant::now();
        let files = gather_statement_files(&self.config.root)?;
        let mut stats = RunStats {
            files_found: files.len(),
            ..Default::default()
        };

        if self.config.dryrun {
            self.print_dryrun(&files);
            return Ok(stats);
        }

        remove_existing_output(&self.config.output_path)?;
        let mut output = create_output(&self.config.output_path)?;

        if files.is_empty() {
            print_warning!("No statement files found in {}", self.config.root.display());
        }

        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .context("Failed to create scratch directory")?;

        interrupt.register_scratch(Some(scratch.path().to_path_buf()));

        if self.config.verbose {
            println!("Scratch directory: {}", scratch.path().display());
        }

        let total = files.len();
        let num_digits = total.to_string().chars().count();

        for (index, file) in files.iter().enumerate() {
            if interrupt.is_requested() {
                stats.aborted = true;
                break;
            }

            let name = kontoauszug_tools::get_relative_path_or_filename(file, &self.config.root);
            print!("{:>width$}/{total}: {name}", index + 1, width = num_digits);
            let _ = io::stdout().flush();

            match self.process_file(file, &scratch) {
                Ok(rows) => {
                    output
                        .write_all(&rows)
                        .with_context(|| format!("Failed to append rows to {}", self.config.output_path.display()))?;
                    let count = count_rows(&rows);
                    if count == 0 {
                        println!(" ({})", "0".yellow());
                    } else {
                        println!(" ({})", count.to_string().cyan());
                    }
                    stats.add_converted(count);
                }
                Err(error) => {
                    println!();
                    print_error!("{name}: {error:#}");
                    stats.add_failed();
                }
            }
        }

        output
            .flush()
            .with_context(|| format!("Failed to write {}", self.config.output_path.display()))?;

        interrupt.register_scratch(None);
        let scratch_path = scratch.path().to_path_buf();
        scratch
            .close()
            .with_context(|| format!("Failed to remove scratch directory: {}", scratch_path.display()))?;

        stats.total_duration = start.elapsed();
        Ok(stats)
    }

    /// Copy one statement into the scratch directory, convert it and extract its rows.
    fn process_file(&self, file: &Path, scratch: &TempDir) -> Result<Vec<u8>> {
        let copy = working_copy_path(file, scratch.path())?;
        fs::copy(file, &copy).with_context(|| format!("Failed to copy {} to scratch directory", file.display()))?;

        if self.config.verbose {
            println!();
            println!("  {}", self.converter.describe(&copy));
        }
        let document = self.converter.convert(&copy)?;

        if self.config.verbose {
            println!("  {}", self.extractor.describe(&document));
        }
        self.extractor.extract(&document)
    }

    fn print_dryrun(&self, files: &[PathBuf]) {
        if self.config.output_path.exists() {
            println!("[DRYRUN] Remove {}", self.config.output_path.display());
        }
        println!("[DRYRUN] Create {}", self.config.output_path.display());
        if files.is_empty() {
            print_warning!("No statement files found in {}", self.config.root.display());
            return;
        }

        let scratch = std::env::temp_dir().join(format!("{SCRATCH_PREFIX}XXXXXX"));
        for file in files {
            let Ok(copy) = working_copy_path(file, &scratch) else {
                continue;
            };
            let document = PdfToHtml::output_path(&copy);
            println!(
                "{}",
                kontoauszug_tools::get_relative_path_or_filename(file, &self.config.root).bold()
            );
            println!("[DRYRUN] {}", self.converter.describe(&copy));
            println!(
                "[DRYRUN] {} >> {}",
                self.extractor.describe(&document),
                self.config.output_path.display()
            );
        }
    }
}

/// Find the statement PDFs directly inside `root`, sorted by file name.
fn gather_statement_files(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).with_context(|| format!("Failed to read directory: {}", root.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_statement_file(path))
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn is_statement_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| RE_STATEMENT_FILE.is_match(name.as_encoded_bytes()))
}

/// Remove the output file left over from a previous run.
///
/// A missing file is fine, any other failure is an error.
fn remove_existing_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => {
            Err(error).with_context(|| format!("Failed to remove existing output file: {}", path.display()))
        }
    }
}

fn create_output(path: &Path) -> Result<File> {
    OpenOptions::new()
        .append(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))
}

fn working_copy_path(file: &Path, scratch: &Path) -> Result<PathBuf> {
    let file_name = file
        .file_name()
        .with_context(|| format!("Statement path has no file name: {}", file.display()))?;
    Ok(scratch.join(file_name))
}

/// Number of lines in the extracted output.
fn count_rows(rows: &[u8]) -> usize {
    let newlines = rows.iter().filter(|&&byte| byte == b'\n').count();
    if rows.last().is_some_and(|&byte| byte != b'\n') {
        newlines + 1
    } else {
        newlines
    }
}

#[cfg(test)]
mod test_batch_converter {
    use super::*;

    use std::cell::RefCell;

    /// Writes `<stem>.html` with the input content and records the converted paths.
    #[derive(Default)]
    struct FakeConverter {
        inputs: RefCell<Vec<PathBuf>>,
    }

    impl DocumentConverter for FakeConverter {
        fn convert(&self, input: &Path) -> Result<PathBuf> {
            self.inputs.borrow_mut().push(input.to_path_buf());
            let content = fs::read(input)?;
            if content.starts_with(b"BROKEN") {
                anyhow::bail!("fake converter failed with exit status: 1");
            }
            let output = PdfToHtml::output_path(input);
            fs::write(&output, content)?;
            Ok(output)
        }

        fn describe(&self, input: &Path) -> String {
            format!("fake-convert {}", input.display())
        }
    }

    /// Returns the document content as rows.
    struct FakeExtractor;

    impl RowExtractor for FakeExtractor {
        fn extract(&self, document: &Path) -> Result<Vec<u8>> {
            let content = fs::read(document)?;
            if content.starts_with(b"FAIL") {
                anyhow::bail!("fake extractor failed with exit status: 1");
            }
            Ok(content)
        }

        fn describe(&self, document: &Path) -> String {
            format!("fake-extract {}", document.display())
        }
    }

    fn batch(root: &Path) -> BatchConverter<FakeConverter, FakeExtractor> {
        let config = Config::for_directory(root.to_path_buf(), false, false);
        BatchConverter::with_commands(config, FakeConverter::default(), FakeExtractor)
    }

    fn run(batch: &BatchConverter<FakeConverter, FakeExtractor>) -> RunStats {
        batch.convert_all(&Interrupt::default()).unwrap()
    }

    fn output(root: &Path) -> String {
        fs::read_to_string(root.join(crate::config::OUTPUT_FILE_NAME)).unwrap()
    }

    #[test]
    fn matches_statement_file_names() {
        assert!(is_statement_file(Path::new("Girokonto_5400_Kontoauszug_20230201.pdf")));
        assert!(is_statement_file(Path::new("/data/Girokonto__Kontoauszug_.pdf")));
        assert!(!is_statement_file(Path::new("Girokonto_5400_Kontoauszug_20230201.PDF")));
        assert!(!is_statement_file(Path::new("girokonto_5400_Kontoauszug_20230201.pdf")));
        assert!(!is_statement_file(Path::new("Girokonto_5400_Kontoauszug_20230201.pdf.bak")));
        assert!(!is_statement_file(Path::new("Depot_5400_Kontoauszug_20230201.pdf")));
        assert!(!is_statement_file(Path::new("transactions.csv")));
    }

    #[test]
    fn zero_files_creates_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let stats = run(&batch(dir.path()));
        assert_eq!(stats.files_found, 0);
        assert_eq!(output(dir.path()), "");
    }

    #[test]
    fn rows_are_concatenated_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_2023_02.pdf"), "b1\nb2\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_2023_01.pdf"), "a1\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_2023_03.pdf"), "c1\nc2\nc3\n").unwrap();

        let stats = run(&batch(dir.path()));

        assert_eq!(output(dir.path()), "a1\nb1\nb2\nc1\nc2\nc3\n");
        assert_eq!(stats.files_found, 3);
        assert_eq!(stats.files_converted, 3);
        assert_eq!(stats.rows_written, 6);
    }

    #[test]
    fn non_matching_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "row\n").unwrap();
        fs::write(dir.path().join("Kreditkarte_1_Kontoauszug_1.pdf"), "other\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "text\n").unwrap();
        fs::create_dir(dir.path().join("Girokonto_2_Kontoauszug_2.pdf")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/Girokonto_3_Kontoauszug_3.pdf"), "nested\n").unwrap();

        let batch = batch(dir.path());
        let stats = run(&batch);

        assert_eq!(stats.files_found, 1);
        assert_eq!(output(dir.path()), "row\n");
        assert_eq!(batch.converter.inputs.borrow().len(), 1);
    }

    #[test]
    fn rerun_produces_same_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "x\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_2.pdf"), "y\n").unwrap();

        let batch = batch(dir.path());
        run(&batch);
        let first = output(dir.path());
        run(&batch);
        assert_eq!(output(dir.path()), first);
        assert_eq!(first, "x\ny\n");
    }

    #[test]
    fn previous_output_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(crate::config::OUTPUT_FILE_NAME), "stale\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "fresh\n").unwrap();

        run(&batch(dir.path()));
        assert_eq!(output(dir.path()), "fresh\n");
    }

    #[test]
    fn missing_output_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::config::OUTPUT_FILE_NAME);
        assert!(remove_existing_output(&path).is_ok());
    }

    #[test]
    fn unremovable_output_aborts_before_conversion() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(crate::config::OUTPUT_FILE_NAME)).unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "row\n").unwrap();

        let batch = batch(dir.path());
        let result = batch.convert_all(&Interrupt::default());

        assert!(result.is_err());
        assert!(batch.converter.inputs.borrow().is_empty());
    }

    #[test]
    fn scratch_directory_is_removed_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "row\n").unwrap();

        let batch = batch(dir.path());
        run(&batch);
        run(&batch);

        let inputs = batch.converter.inputs.borrow();
        assert_eq!(inputs.len(), 2);
        let first = inputs[0].parent().unwrap();
        let second = inputs[1].parent().unwrap();
        assert_ne!(first, second);
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(kontoauszug_tools::path_to_filename_string(first).starts_with(SCRATCH_PREFIX));
    }

    #[test]
    fn converter_works_on_a_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Girokonto_1_Kontoauszug_1.pdf");
        fs::write(&source, "row\n").unwrap();

        let batch = batch(dir.path());
        run(&batch);

        let inputs = batch.converter.inputs.borrow();
        assert_ne!(inputs[0], source);
        assert_eq!(inputs[0].file_name(), source.file_name());
        assert!(source.is_file());
        assert!(!dir.path().join("Girokonto_1_Kontoauszug_1.html").exists());
    }

    #[test]
    fn failing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "a\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_2.pdf"), "FAIL\npartial\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_3.pdf"), "BROKEN\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_4.pdf"), "d\n").unwrap();

        let stats = run(&batch(dir.path()));

        assert_eq!(output(dir.path()), "a\nd\n");
        assert_eq!(stats.files_converted, 2);
        assert_eq!(stats.files_failed, 2);
    }

    #[test]
    fn abort_flag_stops_before_next_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "a\n").unwrap();

        let batch = batch(dir.path());
        let interrupt = Interrupt::default();
        assert!(!interrupt.request());
        let stats = batch.convert_all(&interrupt).unwrap();

        assert!(stats.aborted);
        assert_eq!(stats.files_converted, 0);
        assert_eq!(stats.files_remaining(), 1);
        assert_eq!(output(dir.path()), "");
    }

    #[test]
    fn dryrun_does_not_touch_files() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join(crate::config::OUTPUT_FILE_NAME);
        fs::write(&existing, "keep\n").unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "row\n").unwrap();

        let config = Config::for_directory(dir.path().to_path_buf(), true, false);
        let batch = BatchConverter::with_commands(config, FakeConverter::default(), FakeExtractor);
        let stats = batch.convert_all(&Interrupt::default()).unwrap();

        assert_eq!(stats.files_found, 1);
        assert_eq!(fs::read_to_string(existing).unwrap(), "keep\n");
        assert!(batch.converter.inputs.borrow().is_empty());
    }

    #[test]
    fn second_interrupt_is_reported() {
        let interrupt = Interrupt::default();
        assert!(!interrupt.is_requested());
        assert!(!interrupt.request());
        assert!(interrupt.request());
        assert!(interrupt.is_requested());
    }

    #[test]
    fn forced_exit_removes_registered_scratch() {
        let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir().unwrap();
        let path = scratch.path().to_path_buf();
        fs::write(path.join("Girokonto_1_Kontoauszug_1.pdf"), "row\n").unwrap();

        let interrupt = Interrupt::default();
        interrupt.register_scratch(Some(path.clone()));
        interrupt.remove_scratch();

        assert!(!path.exists());
    }

    #[test]
    fn finished_run_leaves_no_scratch_registered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Girokonto_1_Kontoauszug_1.pdf"), "row\n").unwrap();

        let interrupt = Interrupt::default();
        batch(dir.path()).convert_all(&interrupt).unwrap();

        assert!(interrupt.scratch.lock().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_statement_names_are_processed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let name = OsStr::from_bytes(b"Girokonto_M\xFCnchen_Kontoauszug_1.pdf");
        assert!(is_statement_file(Path::new(name)));
        assert!(!is_statement_file(Path::new(OsStr::from_bytes(b"Girokonto_\xFF_Kontoauszug_1.txt"))));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(name), "latin1\n").unwrap();
        fs::write(dir.path().join("Girokonto_A_Kontoauszug_1.pdf"), "ascii\n").unwrap();

        let stats = run(&batch(dir.path()));

        assert_eq!(stats.files_converted, 2);
        assert_eq!(output(dir.path()), "ascii\nlatin1\n");
    }

    #[test]
    fn counts_rows_with_and_without_trailing_newline() {
        assert_eq!(count_rows(b""), 0);
        assert_eq!(count_rows(b"a\n"), 1);
        assert_eq!(count_rows(b"a\nb"), 2);
        assert_eq!(count_rows(b"a\nb\n"), 2);
    }
}
