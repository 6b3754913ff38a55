//! Configuration module for kontoauszug.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::KontoauszugArgs;

/// Name of the combined output file in the base directory.
pub const OUTPUT_FILE_NAME: &str = "transactions.csv";

/// User configuration from the config file.
#[derive(Debug, Default, Deserialize)]
pub struct KontoauszugConfig {
    #[serde(default)]
    dryrun: bool,
    #[serde(default)]
    verbose: bool,
}

/// Wrapper needed for parsing the user config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    kontoauszug: KontoauszugConfig,
}

impl KontoauszugConfig {
    /// Read the `[kontoauszug]` section from the user config file.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub fn get_user_config() -> Result<Self> {
        kontoauszug_tools::config::read_user_config::<UserConfig>().map(|config| config.kontoauszug)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.kontoauszug)
            .map_err(|e| anyhow!("Failed to parse config: {e}"))
    }
}

/// Final config combined from CLI arguments and user config file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory holding the statement PDFs.
    pub(crate) root: PathBuf,
    /// Combined CSV file inside the base directory.
    pub(crate) output_path: PathBuf,
    pub(crate) dryrun: bool,
    pub(crate) verbose: bool,
}

impl Config {
    /// Create config from given command line args and user config file.
    ///
    /// # Errors
    /// Returns an error if the user config is invalid or the base directory is not usable.
    pub fn from_args(args: &KontoauszugArgs) -> Result<Self> {
        Self::from_args_and_config(args, &KontoauszugConfig::get_user_config()?)
    }

    /// Create config from given command line args and explicit user config.
    ///
    /// # Errors
    /// Returns an error if the base directory does not exist or is not a directory.
    pub fn from_args_and_config(args: &KontoauszugArgs, user_config: &KontoauszugConfig) -> Result<Self> {
        let root = kontoauszug_tools::resolve_input_path(args.path.as_deref())?;
        if !root.is_dir() {
            anyhow::bail!("Input path is not a directory: {}", root.display());
        }
        Ok(Self::for_directory(
            root,
            args.print || user_config.dryrun,
            args.verbose || user_config.verbose,
        ))
    }

    /// Config for an already resolved base directory.
    pub fn for_directory(root: PathBuf, dryrun: bool, verbose: bool) -> Self {
        let output_path = root.join(OUTPUT_FILE_NAME);
        Self {
            root,
            output_path,
            dryrun,
            verbose,
        }
    }
}
