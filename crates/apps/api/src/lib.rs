//! cleanup-api - Multi-user backend for linking Google accounts
//!
//! Routes:
//! - `GET /health`
//! - `GET /oauth/google/start`, `GET /oauth/google/callback`
//! - `GET /accounts`, `DELETE /accounts/{id}`, `GET /accounts/{id}/messages`
//! - `POST /logout`
//!
//! Sessions are stored server-side and named by the `session` cookie. The
//! current user is provisioned on first use. Storage and Gmail calls are
//! blocking and run on tokio's blocking pool.

mod error;
mod session;
mod settings;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cleanup::accounts::oauth::{begin_authorization, complete_authorization};
use cleanup::accounts::{
    AccountMessagesService, AccountStore, AccountSummary, GmailMessageClientFactory, GoogleOAuth,
    OAuthProvider, SqliteAccountStore,
};
use cleanup::{CredentialVault, GmailCredentials};
use log::info;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub use error::ApiError;
pub use session::{CLEAR_COOKIE, RequestSession, SESSION_COOKIE, cookie_value};
pub use settings::ApiSettings;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AccountStore>,
    pub vault: Arc<CredentialVault>,
    /// `None` when no Google OAuth client is configured
    pub oauth: Option<Arc<dyn OAuthProvider>>,
    pub messages: AccountMessagesService,
    pub frontend_accounts_url: String,
}

impl AppState {
    /// Open the database and build the production services
    ///
    /// Fails when the encryption key is not usable.
    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        let vault = Arc::new(
            CredentialVault::new(&settings.token_enc_key)
                .context("TOKEN_ENC_KEY must be a valid key.")?,
        );

        if let Some(parent) = settings.database_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let store: Arc<dyn AccountStore> = Arc::new(SqliteAccountStore::open(&settings.database_path)?);

        let credentials = GmailCredentials {
            client_id: settings.google_client_id.clone(),
            client_secret: settings.google_client_secret.clone(),
        };
        let oauth = settings.oauth_configured().then(|| {
            Arc::new(GoogleOAuth::new(
                credentials.clone(),
                settings.google_redirect_url.clone(),
            )) as Arc<dyn OAuthProvider>
        });
        let messages = AccountMessagesService::new(
            store.clone(),
            vault.clone(),
            Arc::new(GmailMessageClientFactory::new(credentials)),
        );

        Ok(Self {
            store,
            vault,
            oauth,
            messages,
            frontend_accounts_url: settings.frontend_accounts_url.clone(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/oauth/google/start", get(oauth_start))
        .route("/oauth/google/callback", get(oauth_callback))
        .route("/accounts", get(list_accounts))
        .route("/accounts/{account_id}", delete(delete_account))
        .route("/accounts/{account_id}/messages", get(account_messages))
        .route("/logout", post(logout))
        .with_state(state)
}

/// Run `f` on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
}

fn found(location: &str) -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())])
}

fn oauth_provider(state: &AppState) -> Result<Arc<dyn OAuthProvider>, ApiError> {
    state
        .oauth
        .clone()
        .ok_or_else(|| ApiError::Unavailable("Google OAuth is not configured.".to_string()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn oauth_start(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let oauth = oauth_provider(&state)?;
    blocking(move || {
        let session = RequestSession::resolve(state.store.as_ref(), &headers)?;
        let url = begin_authorization(state.store.as_ref(), oauth.as_ref(), &session.id)?;
        Ok(session.respond(found(&url)))
    })
    .await
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let oauth = oauth_provider(&state)?;
    blocking(move || {
        let session = RequestSession::resolve(state.store.as_ref(), &headers)?;
        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing authorization code.".to_string()))?;
        let account = complete_authorization(
            state.store.as_ref(),
            oauth.as_ref(),
            &state.vault,
            &session.id,
            &code,
            params.state.as_deref(),
        )?;
        info!("OAuth callback linked account {}", account.id);
        Ok(session.respond(found(&state.frontend_accounts_url)))
    })
    .await
}

async fn list_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    blocking(move || {
        let mut session = RequestSession::resolve(state.store.as_ref(), &headers)?;
        let user = session.current_user(state.store.as_ref())?;
        let accounts: Vec<AccountSummary> = state
            .store
            .list_accounts(user.id)?
            .iter()
            .map(AccountSummary::from)
            .collect();
        Ok(session.respond(Json(json!({ "accounts": accounts }))))
    })
    .await
}

async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account_id): Path<i64>,
) -> Result<Response, ApiError> {
    blocking(move || {
        let mut session = RequestSession::resolve(state.store.as_ref(), &headers)?;
        let user = session.current_user(state.store.as_ref())?;
        if !state.store.delete_account(user.id, account_id)? {
            return Err(ApiError::NotFound("Account not found".to_string()));
        }
        info!("User {} unlinked account {}", user.id, account_id);
        Ok(session.respond(Json(json!({ "deleted": true }))))
    })
    .await
}

async fn account_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account_id): Path<i64>,
) -> Result<Response, ApiError> {
    blocking(move || {
        let mut session = RequestSession::resolve(state.store.as_ref(), &headers)?;
        let user = session.current_user(state.store.as_ref())?;
        let messages = state.messages.list_messages(user.id, account_id)?;
        Ok(session.respond(Json(messages)))
    })
    .await
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    blocking(move || {
        if let Some(id) = cookie_value(&headers, SESSION_COOKIE) {
            state.store.delete_session(&id)?;
        }
        let mut response = Json(json!({ "logged_out": true })).into_response();
        response
            .headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_static(CLEAR_COOKIE));
        Ok(response)
    })
    .await
}
