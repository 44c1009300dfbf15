//! Account records and API shapes

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A local user owning zero or more Google accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A Google account linked to a user
///
/// Unique per `(user_id, google_sub)`. Deleted with its user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleAccount {
    pub id: i64,
    pub user_id: i64,
    /// OpenID subject of the Google identity
    pub google_sub: String,
    pub email: String,
    /// Refresh credential, encrypted by the credential vault
    pub token_encrypted: String,
    /// Space-separated granted scopes
    pub scopes: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Values written when an OAuth callback links or reconnects an account
#[derive(Debug, Clone)]
pub struct AccountGrant {
    pub user_id: i64,
    pub google_sub: String,
    pub email: String,
    pub token_encrypted: String,
    pub scopes: String,
}

/// Public view of a linked account (no credential)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: i64,
    pub google_sub: String,
    pub email: String,
    pub scopes: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&GoogleAccount> for AccountSummary {
    fn from(account: &GoogleAccount) -> Self {
        Self {
            id: account.id,
            google_sub: account.google_sub.clone(),
            email: account.email.clone(),
            scopes: account.scopes.clone(),
            created_at: account.created_at,
            last_used_at: account.last_used_at,
        }
    }
}

/// Server-side session keyed by the `session` cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: Option<i64>,
    /// Pending OAuth state, cleared when a callback consumes it
    pub oauth_state: Option<String>,
}

/// Normalized preview of a message in a linked account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub snippet: String,
    pub date: DateTime<Utc>,
}
