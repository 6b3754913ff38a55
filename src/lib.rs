pub mod command;
pub mod config;
pub mod statement;

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Command;
use clap_complete::Shell;
use colored::Colorize;

/// Resolves the provided input path to an absolute directory or file path.
///
/// If `path` is `None` or blank, the current working directory is used.
/// Paths that are not valid Unicode are used as given.
/// Returns an error if the path does not exist or is not accessible.
///
/// ```rust
/// use std::path::Path;
/// use kontoauszug_tools::resolve_input_path;
///
/// let absolute_path = resolve_input_path(Some(Path::new("src"))).unwrap();
/// assert!(absolute_path.is_absolute());
/// ```
pub fn resolve_input_path(path: Option<&Path>) -> Result<PathBuf> {
    let given = path.and_then(|p| match p.to_str() {
        Some(text) if text.trim().is_empty() => None,
        Some(text) => Some(PathBuf::from(text.trim())),
        None => Some(p.to_path_buf()),
    });

    let filepath = match given {
        Some(filepath) => filepath,
        None => env::current_dir().context("Failed to get current working directory")?,
    };
    if !filepath.exists() {
        anyhow::bail!(
            "Input path does not exist or is not accessible: '{}'",
            filepath.display()
        );
    }

    dunce::canonicalize(&filepath).with_context(|| format!("Failed to resolve path: {}", filepath.display()))
}

/// Path of a program installed in the same directory as the running executable.
///
/// Falls back to the bare program name so that it gets looked up from `PATH`
/// when there is no such file next to the executable.
#[must_use]
pub fn sibling_executable(name: &str) -> PathBuf {
    let file_name = format!("{name}{}", env::consts::EXE_SUFFIX);
    env::current_exe()
        .ok()
        .and_then(|exe| dunce::canonicalize(exe).ok())
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(file_name))
}

/// Gets the relative path or filename from a full path based on a root directory.
///
/// ```rust
/// use std::path::Path;
/// use kontoauszug_tools::get_relative_path_or_filename;
///
/// let root = Path::new("/home/user/statements");
/// let relative = get_relative_path_or_filename(&root.join("2024/file.pdf"), root);
/// assert_eq!(relative, "2024/file.pdf");
///
/// let outside = get_relative_path_or_filename(Path::new("/tmp/other.pdf"), root);
/// assert_eq!(outside, "other.pdf");
/// ```
#[must_use]
pub fn get_relative_path_or_filename(full_path: &Path, root: &Path) -> String {
    if full_path == root {
        return path_to_filename_string(full_path);
    }
    full_path.strip_prefix(root).map_or_else(
        |_| {
            full_path.file_name().map_or_else(
                || full_path.display().to_string(),
                |name| name.to_string_lossy().to_string(),
            )
        },
        |relative_path| relative_path.display().to_string(),
    )
}

/// Convert `OsStr` to String with invalid Unicode handling.
pub fn os_str_to_string(name: &OsStr) -> String {
    name.to_str().map_or_else(
        || name.to_string_lossy().replace('\u{FFFD}', ""),
        std::string::ToString::to_string,
    )
}

/// Convert given path to filename string with invalid Unicode handling.
#[must_use]
pub fn path_to_filename_string(path: &Path) -> String {
    os_str_to_string(path.file_name().unwrap_or_default())
}

#[inline]
pub fn print_error(message: &str) {
    eprintln!("{}", format!("Error: {message}").red());
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::print_error(&format!($($arg)*))
    };
}

#[inline]
pub fn print_warning(message: &str) {
    eprintln!("{}", message.yellow());
}

#[macro_export]
macro_rules! print_warning {
    ($($arg:tt)*) => {
        $crate::print_warning(&format!($($arg)*))
    };
}

/// Format duration as a human-readable string
#[must_use]
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Generate a shell completion script for the given shell.
pub fn generate_shell_completion(shell: Shell, mut command: Command, install: bool, command_name: &str) -> Result<()> {
    if install {
        let out_dir = get_shell_completion_dir(shell, command_name)?;
        let path = clap_complete::generate_to(shell, &mut command, command_name, out_dir)?;
        println!("Completion file generated to: {}", path.display());
    } else {
        clap_complete::generate(shell, &mut command, command_name, &mut std::io::stdout());
    }
    Ok(())
}

/// Determine the directory for storing shell completions.
///
/// Prefers an existing user-specific directory, then an existing global one.
/// If neither exists, the user-specific directory is created.
fn get_shell_completion_dir(shell: Shell, name: &str) -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;

    // oh-my-zsh custom plugin, has to be enabled in .zshrc
    if shell == Shell::Zsh {
        let omz_plugins = home.join(".oh-my-zsh/custom/plugins");
        if omz_plugins.exists() {
            let plugin_dir = omz_plugins.join(name);
            std::fs::create_dir_all(&plugin_dir)?;
            return Ok(plugin_dir);
        }
    }

    let user_dir = match shell {
        Shell::PowerShell => {
            if cfg!(windows) {
                home.join(r"Documents\PowerShell\completions")
            } else {
                home.join(".config/powershell/completions")
            }
        }
        Shell::Bash => home.join(".bash_completion.d"),
        Shell::Elvish => home.join(".elvish"),
        Shell::Fish => home.join(".config/fish/completions"),
        Shell::Zsh => home.join(".zsh/completions"),
        _ => anyhow::bail!("Unsupported shell"),
    };

    if user_dir.exists() {
        return Ok(user_dir);
    }

    let global_dir = match shell {
        Shell::Bash => Some(PathBuf::from("/etc/bash_completion.d")),
        Shell::Fish => Some(PathBuf::from("/usr/share/fish/completions")),
        Shell::Zsh => Some(PathBuf::from("/usr/share/zsh/site-functions")),
        _ => None,
    };

    if let Some(global_dir) = global_dir.filter(|dir| dir.exists()) {
        return Ok(global_dir);
    }

    std::fs::create_dir_all(&user_dir)?;
    Ok(user_dir)
}
