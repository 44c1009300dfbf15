//! Gmail OAuth2 token management
//!
//! Two token sources share one type:
//! - **Installed app** (CLI): authorization code flow through a local HTTP
//!   listener, tokens cached in `token.json` in the application directory.
//! - **Stored refresh credential** (web backend): an in-memory token built
//!   from a decrypted refresh token; never falls back to an interactive flow.
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::GmailCredentials;

/// Scope required for labeling and trashing (read + label changes)
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Cached CLI token filename in the application directory
const TOKEN_FILE: &str = "token.json";

/// Seconds of remaining lifetime below which a token is refreshed
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Stored token data
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

impl StoredToken {
    fn from_response(token: &TokenResponse) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at > chrono::Utc::now().timestamp() + EXPIRY_BUFFER_SECS)
    }
}

/// Token response from Google's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    /// Space-separated granted scopes
    pub scope: Option<String>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

enum TokenStore {
    /// Token cached on disk, interactive flow allowed
    File(PathBuf),
    /// Token held in memory for a stored refresh credential
    Memory(Mutex<StoredToken>),
}

/// OAuth2 configuration and token management for Gmail
pub struct GmailAuth {
    credentials: GmailCredentials,
    store: TokenStore,
}

impl GmailAuth {
    /// Google OAuth2 endpoints
    pub const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    pub const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Port range to try for the local OAuth callback server
    const PORT_RANGE_START: u16 = 8080;
    const PORT_RANGE_END: u16 = 8090;

    /// Installed-app auth with tokens cached in the application directory
    pub fn new(credentials: GmailCredentials) -> Result<Self> {
        Ok(Self::with_token_path(credentials, Self::default_token_path()?))
    }

    /// Installed-app auth with an explicit token cache path
    pub fn with_token_path(credentials: GmailCredentials, token_path: PathBuf) -> Self {
        Self {
            credentials,
            store: TokenStore::File(token_path),
        }
    }

    /// Auth backed by a stored refresh credential
    ///
    /// Exchanges the refresh token immediately so a revoked or malformed
    /// credential fails here rather than on the first API call.
    pub fn from_refresh_token(credentials: GmailCredentials, refresh_token: &str) -> Result<Self> {
        let token = refresh_access_token(&credentials, refresh_token)?;
        Ok(Self {
            credentials,
            store: TokenStore::Memory(Mutex::new(StoredToken::from_response(&token))),
        })
    }

    /// Default CLI token path (`<app dir>/token.json`)
    pub fn default_token_path() -> Result<PathBuf> {
        config::config_path(TOKEN_FILE).context("Could not determine config directory")
    }

    /// Path of the cached token, if this auth is file-backed
    pub fn token_path(&self) -> Option<&Path> {
        match &self.store {
            TokenStore::File(path) => Some(path),
            TokenStore::Memory(_) => None,
        }
    }

    /// Get a valid access token, refreshing or re-authenticating as needed
    pub fn get_access_token(&self) -> Result<String> {
        match &self.store {
            TokenStore::File(path) => self.file_access_token(path),
            TokenStore::Memory(token) => self.memory_access_token(token),
        }
    }

    fn file_access_token(&self, path: &Path) -> Result<String> {
        if let Ok(token) = load_token(path) {
            if token.is_fresh() {
                return Ok(token.access_token);
            }

            if let Some(refresh_token) = token.refresh_token {
                match refresh_access_token(&self.credentials, &refresh_token) {
                    Ok(new_token) => {
                        save_token(path, &StoredToken::from_response(&new_token))?;
                        return Ok(new_token.access_token);
                    }
                    Err(e) => warn!("Token refresh failed, re-authenticating: {e:#}"),
                }
            }
        }

        let token = self.authorization_code_auth()?;
        save_token(path, &StoredToken::from_response(&token))?;
        Ok(token.access_token)
    }

    fn memory_access_token(&self, token: &Mutex<StoredToken>) -> Result<String> {
        let mut guard = token
            .lock()
            .map_err(|_| anyhow::anyhow!("token lock poisoned"))?;
        if guard.is_fresh() {
            return Ok(guard.access_token.clone());
        }

        let refresh_token = guard
            .refresh_token
            .clone()
            .context("Stored credential has no refresh token")?;
        debug!("Refreshing access token for stored credential");
        let new_token = refresh_access_token(&self.credentials, &refresh_token)?;
        *guard = StoredToken::from_response(&new_token);
        Ok(new_token.access_token)
    }

    /// Perform authorization code flow authentication
    fn authorization_code_auth(&self) -> Result<TokenResponse> {
        let (listener, port) = self.start_local_server()?;
        let redirect_uri = format!("http://localhost:{}", port);

        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(GMAIL_MODIFY_SCOPE),
        );

        println!("\n=== Gmail Authentication Required ===");
        println!("Opening browser for authentication...");
        println!("If the browser doesn't open, visit: {}", auth_url);

        if let Err(e) = open::that(&auth_url) {
            eprintln!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        println!("Waiting for authorization...");
        let code = wait_for_callback(listener)?;

        info!("Exchanging authorization code for tokens");
        let token = exchange_code(&self.credentials, &code, &redirect_uri)?;
        println!("Authentication successful!\n");
        Ok(token)
    }

    fn start_local_server(&self) -> Result<(TcpListener, u16)> {
        for port in Self::PORT_RANGE_START..=Self::PORT_RANGE_END {
            if let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{}", port)) {
                return Ok((listener, port));
            }
        }
        anyhow::bail!(
            "Could not bind to any port in range {}-{}",
            Self::PORT_RANGE_START,
            Self::PORT_RANGE_END
        )
    }

    /// Clear the cached CLI token (logout)
    pub fn logout(&self) -> Result<()> {
        if let TokenStore::File(path) = &self.store
            && path.exists()
        {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Exchange an authorization code for tokens
pub(crate) fn exchange_code(
    credentials: &GmailCredentials,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let mut response = ureq::post(GmailAuth::TOKEN_URL)
        .send_form([
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])
        .context("Failed to exchange authorization code")?;

    response
        .body_mut()
        .read_json()
        .context("Failed to parse token response")
}

/// Refresh an access token using a refresh token
pub(crate) fn refresh_access_token(
    credentials: &GmailCredentials,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let response = ureq::post(GmailAuth::TOKEN_URL)
        .send_form([
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .context("Failed to refresh access token")?;

    let mut token: TokenResponse = response
        .into_body()
        .read_json()
        .context("Failed to parse refresh token response")?;

    // Google omits the refresh token on refresh responses
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh_token.to_string());
    }

    Ok(token)
}

fn load_token(path: &Path) -> Result<StoredToken> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    config::save_json_file(path, token)
}

/// Wait for the OAuth redirect and extract the authorization code
fn wait_for_callback(listener: TcpListener) -> Result<String> {
    let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .context("Failed to read request")?;

    // Format: GET /?code=AUTH_CODE&scope=... HTTP/1.1
    let code = callback_param(&request_line, "code");
    let error = callback_param(&request_line, "error");

    let (status, body) = if code.is_some() {
        ("200 OK", "Authentication successful! You can close this window.")
    } else {
        ("400 Bad Request", "Authentication failed. Please try again.")
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
        status, body
    );
    stream.write_all(response.as_bytes()).ok();

    if let Some(err) = error {
        anyhow::bail!("OAuth error: {}", err);
    }

    code.context("No authorization code received")
}

/// Extract a decoded query parameter from an HTTP request line
fn callback_param(request_line: &str, name: &str) -> Option<String> {
    let path = request_line.split_whitespace().nth(1)?;
    let query = path.split_once('?')?.1;
    query.split('&').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key == name {
            urlencoding::decode(value).ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}
