//! Web OAuth flow for linking Google accounts
//!
//! [`begin_authorization`] stores a random state on the session and returns
//! the consent URL. [`complete_authorization`] consumes that state with a
//! single conditional update before doing anything else, so a replayed
//! callback fails closed even if the code exchange would succeed.

use anyhow::Context;
use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

use super::models::{AccountGrant, GoogleAccount};
use super::store::AccountStore;
use crate::config::GmailCredentials;
use crate::gmail::{GMAIL_MODIFY_SCOPE, GmailAuth, exchange_code};
use crate::vault::{CredentialVault, VaultError};

/// Scopes requested when linking an account
pub const OAUTH_SCOPES: &[&str] = &[GMAIL_MODIFY_SCOPE, "openid", "email", "profile"];

const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Tokens returned by the code exchange
#[derive(Debug, Clone, Default)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes
    pub scope: Option<String>,
}

/// OpenID userinfo fields used to identify the account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    pub sub: Option<String>,
    pub email: Option<String>,
}

/// Google's side of the web OAuth flow
pub trait OAuthProvider: Send + Sync {
    /// Consent URL carrying `state`
    fn authorization_url(&self, state: &str) -> String;

    fn exchange_code(&self, code: &str) -> anyhow::Result<TokenGrant>;

    fn fetch_userinfo(&self, access_token: &str) -> anyhow::Result<UserInfo>;
}

/// OAuth flow failures
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth state missing or mismatch.")]
    StateMismatch,

    #[error("Google did not return a refresh token. Reconnect with consent prompt.")]
    MissingRefreshToken,

    #[error("Google userinfo missing sub/email.")]
    MissingIdentity,

    #[error("OAuth exchange failed: {0:#}")]
    Exchange(#[source] anyhow::Error),

    #[error("failed to encrypt refresh token: {0}")]
    Encryption(#[from] VaultError),

    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

/// Google OAuth endpoints for a web client
pub struct GoogleOAuth {
    credentials: GmailCredentials,
    redirect_url: String,
}

impl GoogleOAuth {
    pub fn new(credentials: GmailCredentials, redirect_url: impl Into<String>) -> Self {
        Self {
            credentials,
            redirect_url: redirect_url.into(),
        }
    }
}

impl OAuthProvider for GoogleOAuth {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&access_type=offline&include_granted_scopes=true&prompt=consent",
            GmailAuth::AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(&OAUTH_SCOPES.join(" ")),
            urlencoding::encode(state),
        )
    }

    fn exchange_code(&self, code: &str) -> anyhow::Result<TokenGrant> {
        let token = exchange_code(&self.credentials, code, &self.redirect_url)?;
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            scope: token.scope,
        })
    }

    fn fetch_userinfo(&self, access_token: &str) -> anyhow::Result<UserInfo> {
        let mut response = ureq::get(USERINFO_URL)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to fetch Google userinfo")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse Google userinfo")
    }
}

/// Start linking: remember a fresh state on the session, return the consent URL
pub fn begin_authorization(
    store: &dyn AccountStore,
    provider: &dyn OAuthProvider,
    session_id: &str,
) -> Result<String, OAuthError> {
    let state = uuid::Uuid::new_v4().simple().to_string();
    store
        .set_oauth_state(session_id, &state)
        .map_err(OAuthError::Storage)?;
    Ok(provider.authorization_url(&state))
}

/// Finish linking: consume the state, exchange the code and upsert the account
///
/// The account is attached to the session's current user (provisioned when
/// needed) and the session is bound to that user.
pub fn complete_authorization(
    store: &dyn AccountStore,
    provider: &dyn OAuthProvider,
    vault: &CredentialVault,
    session_id: &str,
    code: &str,
    state: Option<&str>,
) -> Result<GoogleAccount, OAuthError> {
    let state = state.filter(|s| !s.is_empty()).ok_or(OAuthError::StateMismatch)?;
    if !store
        .consume_oauth_state(session_id, state)
        .map_err(OAuthError::Storage)?
    {
        warn!("Rejected OAuth callback with missing or mismatched state");
        return Err(OAuthError::StateMismatch);
    }

    let grant = provider.exchange_code(code).map_err(OAuthError::Exchange)?;
    let refresh_token = grant
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or(OAuthError::MissingRefreshToken)?;

    let userinfo = provider
        .fetch_userinfo(&grant.access_token)
        .map_err(OAuthError::Exchange)?;
    let (Some(google_sub), Some(email)) = (
        userinfo.sub.filter(|s| !s.is_empty()),
        userinfo.email.filter(|s| !s.is_empty()),
    ) else {
        return Err(OAuthError::MissingIdentity);
    };

    let session_user = store
        .get_session(session_id)
        .map_err(OAuthError::Storage)?
        .and_then(|s| s.user_id);
    let user = store.current_user(session_user).map_err(OAuthError::Storage)?;
    store
        .set_session_user(session_id, user.id)
        .map_err(OAuthError::Storage)?;

    let scopes = grant
        .scope
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| OAUTH_SCOPES.join(" "));

    let account = store
        .upsert_account(&AccountGrant {
            user_id: user.id,
            google_sub,
            email,
            token_encrypted: vault.encrypt(&refresh_token)?,
            scopes,
        })
        .map_err(OAuthError::Storage)?;

    info!("Linked Google account {} for user {}", account.id, user.id);
    Ok(account)
}
