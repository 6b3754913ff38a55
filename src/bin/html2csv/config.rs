//! Configuration module for html2csv.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::Html2CsvArgs;

/// User configuration from the config file.
#[derive(Debug, Default, Deserialize)]
pub struct Html2CsvConfig {
    /// Print verbose output.
    #[serde(default)]
    pub verbose: bool,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    html2csv: Html2CsvConfig,
}

impl Html2CsvConfig {
    /// Read the `[html2csv]` section from the user config file.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub fn get_user_config() -> Result<Self> {
        kontoauszug_tools::config::read_user_config::<UserConfig>().map(|config| config.html2csv)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.html2csv)
            .map_err(|e| anyhow!("Failed to parse config: {e}"))
    }
}

/// Final config combined from CLI arguments and user config file.
#[derive(Debug)]
pub struct Config {
    /// Absolute paths of the input documents in argument order.
    pub inputs: Vec<PathBuf>,
    /// Print verbose output.
    pub verbose: bool,
}

impl Config {
    /// Create config from given command line args and user config file.
    ///
    /// # Errors
    /// Returns an error if the user config is invalid or an input path does not exist.
    pub fn from_args(args: &Html2CsvArgs) -> Result<Self> {
        Self::from_args_and_config(args, &Html2CsvConfig::get_user_config()?)
    }

    /// Create config from given command line args and explicit user config.
    ///
    /// # Errors
    /// Returns an error if an input path does not exist.
    pub fn from_args_and_config(args: &Html2CsvArgs, user_config: &Html2CsvConfig) -> Result<Self> {
        let inputs = args
            .paths
            .iter()
            .map(|path| kontoauszug_tools::resolve_input_path(Some(path)))
            .collect::<Result<Vec<_>>>()?;

        if let Some(directory) = inputs.iter().find(|path| !path.is_file()) {
            anyhow::bail!("Input path is not a file: {}", directory.display());
        }

        Ok(Self {
            inputs,
            verbose: args.verbose || user_config.verbose,
        })
    }
}
