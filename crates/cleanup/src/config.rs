//! Configuration for gmail-cleanup
//!
//! Two things live here:
//! - [`AppConfig`]: the CLI defaults persisted as `config.json` in the
//!   application directory. It is loaded once and passed to each command.
//! - [`GmailCredentials`]: the OAuth client used for Gmail access, loaded from
//!   (in order of priority):
//!   1. JSON file (Google Cloud Console format) in the application directory
//!   2. Runtime environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI defaults filename in the application directory
const CONFIG_FILE: &str = "config.json";

/// Credentials filename in the application directory
const CREDENTIALS_FILE: &str = "credentials.json";

const CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";

/// Defaults applied when a command does not override them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Label applied by `label` and used by `trash` when none is given
    pub default_target_label: String,
    /// Largest trash target allowed without `--force`
    pub max_trash_without_force: usize,
    pub default_export_limit: usize,
    pub default_scan_limit: usize,
    pub default_sample: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_target_label: "cleanup/candidates".to_string(),
            max_trash_without_force: 5000,
            default_export_limit: 200,
            default_scan_limit: 500,
            default_sample: 10,
        }
    }
}

impl AppConfig {
    /// Load `config.json`, falling back to defaults when it does not exist
    ///
    /// Missing keys take their default values.
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Location of `config.json`
    pub fn path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    /// Write the default template, keeping an existing file unless `overwrite`
    pub fn write_template(overwrite: bool) -> Result<PathBuf> {
        let path = Self::path().context("Could not determine config directory")?;
        Self::write_template_to(&path, overwrite)?;
        Ok(path)
    }

    /// Write the default template to an explicit path
    ///
    /// Returns `true` when the file was written.
    pub fn write_template_to(path: &Path, overwrite: bool) -> Result<bool> {
        if path.exists() && !overwrite {
            return Ok(false);
        }
        config::save_json_file(path, &Self::default())?;
        Ok(true)
    }
}

/// OAuth client credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
}

#[derive(Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials from the application directory, then the environment
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_credentials_path()
            && path.exists()
        {
            return Self::from_file(&path);
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Desktop clients use "installed", web clients use "web"
        let section = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: section.client_id,
            client_secret: section.client_secret,
        })
    }

    /// Parse credentials from a JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var(CLIENT_ID_ENV)
            .with_context(|| format!("{CLIENT_ID_ENV} environment variable not set"))?;
        let client_secret = std::env::var(CLIENT_SECRET_ENV)
            .with_context(|| format!("{CLIENT_SECRET_ENV} environment variable not set"))?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Default credentials file path (`<config dir>/credentials.json`)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (file or env vars)
    pub fn is_available() -> bool {
        config::config_exists(CREDENTIALS_FILE)
            || (std::env::var(CLIENT_ID_ENV).is_ok() && std::env::var(CLIENT_SECRET_ENV).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.default_target_label, "cleanup/candidates");
        assert_eq!(cfg.max_trash_without_force, 5000);
        assert_eq!(cfg.default_export_limit, 200);
        assert_eq!(cfg.default_scan_limit, 500);
        assert_eq!(cfg.default_sample, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_trash_without_force": 100 }"#).unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.max_trash_without_force, 100);
        assert_eq!(cfg.default_target_label, "cleanup/candidates");
    }

    #[test]
    fn test_write_template_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        assert!(AppConfig::write_template_to(&path, false).unwrap());
        std::fs::write(&path, r#"{ "default_sample": 3 }"#).unwrap();
        assert!(!AppConfig::write_template_to(&path, false).unwrap());
        assert_eq!(AppConfig::load_from(&path).unwrap().default_sample, 3);

        assert!(AppConfig::write_template_to(&path, true).unwrap());
        assert_eq!(AppConfig::load_from(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_parse_installed_credentials() {
        let json = r#"{
            "installed": {
                "client_id": "test-client-id.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-client-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
    }

    #[test]
    fn test_parse_web_credentials() {
        let json = r#"{ "web": { "client_id": "web-id", "client_secret": "web-secret" } }"#;
        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-id");
    }

    #[test]
    fn test_credentials_without_section() {
        assert!(GmailCredentials::from_json(r#"{ "other": {} }"#).is_err());
    }
}
