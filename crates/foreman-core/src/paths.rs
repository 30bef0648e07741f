use crate::error::{ForemanError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

pub const DATA_DIR_NAME: &str = ".foreman";
pub const CONFIG_FILE: &str = "config.yaml";
pub const DB_FILE: &str = "foreman.db";

/// Environment variable that relocates the data directory.
pub const HOME_ENV: &str = "FOREMAN_HOME";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve the data directory: explicit override, then `FOREMAN_HOME`, then
/// `~/.foreman`.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    home::home_dir()
        .map(|h| h.join(DATA_DIR_NAME))
        .ok_or(ForemanError::HomeNotFound)
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

pub fn default_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}
