//! External programs used for converting and extracting statement documents.
//!
//! The batch converter only talks to the [`DocumentConverter`] and [`RowExtractor`] traits,
//! so the process-backed implementations can be swapped out in tests.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

use anyhow::{Context, Result};

/// Converter program for PDF statements.
pub const PDFTOHTML: &str = "pdftohtml";

/// `pdftohtml` options: quiet, skip images, single HTML file instead of frames.
const PDFTOHTML_ARGS: &[&str] = &["-q", "-i", "-noframes"];

/// Extension of the document `pdftohtml` writes next to its input.
const HTML_EXTENSION: &str = "html";

/// Converts an input file into an intermediate document.
pub trait DocumentConverter {
    /// Convert `input` and return the path of the produced document.
    ///
    /// # Errors
    /// Returns an error if the conversion fails or produces no document.
    fn convert(&self, input: &Path) -> Result<PathBuf>;

    /// Human-readable form of the conversion for dry-run output.
    fn describe(&self, input: &Path) -> String;
}

/// Extracts tabular rows from an intermediate document.
pub trait RowExtractor {
    /// Extract rows from `document` and return them as raw bytes.
    ///
    /// # Errors
    /// Returns an error if the extraction fails.
    fn extract(&self, document: &Path) -> Result<Vec<u8>>;

    /// Human-readable form of the extraction for dry-run output.
    fn describe(&self, document: &Path) -> String;
}

/// A program with fixed leading arguments that is run with a target path as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the process command for the given target path.
    ///
    /// An absolute target path makes the command run inside the target's parent directory.
    #[must_use]
    pub fn command_for(&self, target: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(target);
        if target.is_absolute()
            && let Some(parent) = target.parent()
        {
            command.current_dir(parent);
        }
        command
    }

    /// Check that the program can be started.
    ///
    /// # Errors
    /// Returns an error if spawning the program fails, for example when it is not installed.
    pub fn check_available(&self, version_arg: &str) -> Result<()> {
        Command::new(&self.program)
            .arg(version_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| {
                format!(
                    "{} not found. Install it first and make sure it is in PATH",
                    self.program.display()
                )
            })?;
        Ok(())
    }

    /// Command line for the given target path.
    #[must_use]
    pub fn display_for(&self, target: &Path) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|arg| arg.to_string_lossy().to_string()));
        parts.push(target.display().to_string());
        parts.join(" ")
    }

    fn name(&self) -> String {
        crate::path_to_filename_string(&self.program)
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())
    }
}

/// `pdftohtml` converter producing `<stem>.html` next to the input file.
#[derive(Debug, Clone)]
pub struct PdfToHtml {
    command: ExternalCommand,
}

impl PdfToHtml {
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(PDFTOHTML)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            command: ExternalCommand::new(program).args(PDFTOHTML_ARGS),
        }
    }

    /// Check that the converter can be started.
    ///
    /// # Errors
    /// Returns an error if `pdftohtml` is not installed.
    pub fn check_available(&self) -> Result<()> {
        self.command.check_available("-v")
    }

    /// Path of the document produced for the given input.
    #[must_use]
    pub fn output_path(input: &Path) -> PathBuf {
        input.with_extension(HTML_EXTENSION)
    }
}

impl Default for PdfToHtml {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentConverter for PdfToHtml {
    fn convert(&self, input: &Path) -> Result<PathBuf> {
        let mut command = self.command.command_for(input);
        // Converter progress output would end up mixed with extracted rows
        command.stdout(Stdio::null()).stderr(Stdio::inherit());

        let status = run_status_isolated(&mut command)
            .with_context(|| format!("Failed to execute {}", self.command.name()))?;
        check_status(&self.command, status)?;

        let output = Self::output_path(input);
        if !output.is_file() {
            anyhow::bail!(
                "{} did not produce a document: {}",
                self.command.name(),
                output.display()
            );
        }
        Ok(output)
    }

    fn describe(&self, input: &Path) -> String {
        self.command.display_for(input)
    }
}

/// Row extractor helper program that writes rows for its single document argument to stdout.
#[derive(Debug, Clone)]
pub struct ProcessExtractor {
    command: ExternalCommand,
}

impl ProcessExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            command: ExternalCommand::new(program),
        }
    }

    /// Check that the helper can be started.
    ///
    /// # Errors
    /// Returns an error if the helper program cannot be found.
    pub fn check_available(&self) -> Result<()> {
        self.command.check_available("--version")
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        self.command.program()
    }
}

impl RowExtractor for ProcessExtractor {
    fn extract(&self, document: &Path) -> Result<Vec<u8>> {
        let mut command = self.command.command_for(document);
        command.stdout(Stdio::piped()).stderr(Stdio::inherit());

        let output = run_output_isolated(&mut command)
            .with_context(|| format!("Failed to execute {}", self.command.name()))?;
        check_status(&self.command, output.status)?;
        Ok(output.stdout)
    }

    fn describe(&self, document: &Path) -> String {
        self.command.display_for(document)
    }
}

fn check_status(command: &ExternalCommand, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        anyhow::bail!("{} failed with {status}", command.name())
    }
}

/// Put the child in its own process group so Ctrl+C only reaches this program.
/// The running file then gets finished before the batch stops.
fn isolate(command: &mut Command) {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
}

fn run_status_isolated(command: &mut Command) -> std::io::Result<ExitStatus> {
    isolate(command);
    command.status()
}

fn run_output_isolated(command: &mut Command) -> std::io::Result<Output> {
    isolate(command);
    command.output()
}

#[cfg(test)]
mod test_external_command {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn command_for_appends_target_and_sets_directory() {
        let command = ExternalCommand::new("tool").args(["-a", "-b"]);
        let process = command.command_for(Path::new("/tmp/scratch/file.pdf"));

        let args: Vec<_> = process.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, vec!["-a", "-b", "/tmp/scratch/file.pdf"]);
        assert_eq!(process.get_program(), "tool");
        assert_eq!(process.get_current_dir(), Some(Path::new("/tmp/scratch")));
    }

    #[test]
    fn command_for_relative_file_keeps_current_directory() {
        let command = ExternalCommand::new("tool");
        let process = command.command_for(Path::new("file.pdf"));
        assert!(process.get_current_dir().is_none());
    }

    #[test]
    fn display_for_shows_full_command_line() {
        let command = ExternalCommand::new("pdftohtml").args(PDFTOHTML_ARGS);
        assert_eq!(
            command.display_for(Path::new("a.pdf")),
            "pdftohtml -q -i -noframes a.pdf"
        );
    }

    #[test]
    fn missing_program_is_not_available() {
        let command = ExternalCommand::new("surely-this-program-does-not-exist-4711");
        let result = command.check_available("--version");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn pdftohtml_output_replaces_extension() {
        assert_eq!(
            PdfToHtml::output_path(Path::new("/tmp/x/Girokonto_1_Kontoauszug_2.pdf")),
            PathBuf::from("/tmp/x/Girokonto_1_Kontoauszug_2.html")
        );
    }

    #[test]
    fn missing_converter_fails_conversion() {
        let converter = PdfToHtml::with_program("surely-this-program-does-not-exist-4711");
        let result = converter.convert(Path::new("/tmp/file.pdf"));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn extractor_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("doc.html");
        std::fs::write(&document, "\"row\",1\n").unwrap();

        let extractor = ProcessExtractor::new("cat");
        let output = extractor.extract(&document).unwrap();
        assert_eq!(output, b"\"row\",1\n");
    }

    #[cfg(unix)]
    #[test]
    fn extractor_failure_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.html");

        let extractor = ProcessExtractor::new("cat");
        let result = extractor.extract(&missing);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cat failed"));
    }
}
