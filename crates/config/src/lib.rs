//! Configuration directory handling for gmail-cleanup
//!
//! Every gmail-cleanup binary keeps its local state (OAuth client
//! credentials, the cached CLI token, `config.json`) in one application
//! directory:
//!
//! - `$GMAIL_CLEANUP_CONFIG_DIR` when set
//! - otherwise `<platform config dir>/gmail-cleanup` (e.g. `~/.config/gmail-cleanup`)
//!
//! Call [`init`] at application startup to bootstrap the directory.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Name of the application directory under the platform config dir
pub const APP_DIR_NAME: &str = "gmail-cleanup";

/// Environment variable overriding the application directory
pub const CONFIG_DIR_ENV: &str = "GMAIL_CLEANUP_CONFIG_DIR";

/// Initialize the application directory, creating it if needed.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Resolve the application directory without touching the filesystem
pub fn config_dir() -> Option<PathBuf> {
    resolve_dir(std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from), dirs::config_dir())
}

fn resolve_dir(override_dir: Option<PathBuf>, platform_dir: Option<PathBuf>) -> Option<PathBuf> {
    match override_dir {
        Some(dir) if !dir.as_os_str().is_empty() => Some(dir),
        _ => platform_dir.map(|p| p.join(APP_DIR_NAME)),
    }
}

/// Path of a file inside the application directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Check whether a file exists inside the application directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Load a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Write a value as pretty JSON to an arbitrary path, creating parent directories
pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

/// Ensure the application directory exists
fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}
