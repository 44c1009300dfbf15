//! Server settings read from the environment

use anyhow::{Context, Result};
use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_REDIRECT_URL: &str = "http://localhost:8000/oauth/google/callback";
const DEFAULT_FRONTEND_ACCOUNTS_URL: &str = "http://localhost:3000/accounts";
const DEFAULT_DATABASE_FILE: &str = "accounts.db";

/// Settings for the API server
///
/// Built once at startup and passed to [`AppState`](crate::AppState).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_url: String,
    /// Key for refresh credential encryption (see [`cleanup::CredentialVault`])
    pub token_enc_key: String,
    /// Where the browser lands after linking an account
    pub frontend_accounts_url: String,
}

impl ApiSettings {
    /// Read settings from process environment variables
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_path = match get("DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => config::config_path(DEFAULT_DATABASE_FILE)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE)),
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_path,
            google_client_id: get("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: get("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            google_redirect_url: get("GOOGLE_REDIRECT_URL")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string()),
            token_enc_key: get("TOKEN_ENC_KEY").context("TOKEN_ENC_KEY is required.")?,
            frontend_accounts_url: get("FRONTEND_ACCOUNTS_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_ACCOUNTS_URL.to_string()),
        })
    }

    /// Whether a Google OAuth client is configured
    pub fn oauth_configured(&self) -> bool {
        !self.google_client_id.is_empty() && !self.google_client_secret.is_empty()
    }
}
