//! Reading and writing the TOML configuration file.

use super::{Config, config_file_path};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Parse the configuration at `path`, or the defaults when it is absent.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    toml::from_str(&contents).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load the configuration from [`config_file_path`].
///
/// Falls back to defaults when no config directory can be determined.
pub fn load_default_config() -> Result<Config> {
    config_file_path().map_or_else(|_| Ok(Config::default()), |path| load_config_file(&path))
}

/// Write `config` to `path`, creating parent directories.
///
/// The file is written next to its destination and renamed into place so a
/// crash never leaves a truncated config behind.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let write_err = |source| Error::ConfigWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let contents = toml::to_string_pretty(config).map_err(|e| Error::ConfigSerialize { source: e })?;

    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, contents).map_err(write_err)?;
    std::fs::rename(&staging, path).map_err(write_err)
}

/// Save to [`config_file_path`] and return where it went.
pub fn save_default_config(config: &Config) -> Result<PathBuf> {
    let path = config_file_path()?;
    save_config(config, &path)?;
    Ok(path)
}
