//! Multi-user Google account management
//!
//! This module provides:
//! - Persistent users, linked Google accounts and server-side sessions ([`store`])
//! - The web OAuth flow with single-use state ([`oauth`])
//! - Recent-message previews for an owned account ([`service`])

mod gmail_client;
pub mod models;
pub mod oauth;
pub mod service;
pub mod store;

pub use gmail_client::GmailMessageClientFactory;
pub use models::{AccountGrant, AccountMessage, AccountSummary, GoogleAccount, Session, User};
pub use oauth::{GoogleOAuth, OAUTH_SCOPES, OAuthError, OAuthProvider, TokenGrant, UserInfo};
pub use service::{
    AccountMessagesService, ClientAuthError, MAX_PREVIEW_MESSAGES, MessageClient,
    MessageClientFactory,
};
pub use store::{AccountStore, DEFAULT_LOCAL_USER_EMAIL, SqliteAccountStore};
