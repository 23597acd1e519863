//! Where the configuration file lives.

use crate::constants::{APP_NAME, CONFIG_FILE_NAME, CONFIG_PATH_ENV};
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Platform configuration directory.
///
/// - Linux: `$XDG_CONFIG_HOME/oro/` (usually `~/.config/oro/`)
/// - macOS: `~/Library/Application Support/oro/`
/// - Windows: `%APPDATA%\oro\config\`
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(Error::ConfigDirNotFound)
}

/// Configuration file path: `$ORO_CONFIG` when set and non-empty,
/// otherwise `config.toml` in [`config_dir`].
pub fn config_file_path() -> Result<PathBuf> {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Ok(config_dir()?.join(CONFIG_FILE_NAME)),
    }
}
