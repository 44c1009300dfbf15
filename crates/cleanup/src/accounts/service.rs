//! Recent-message previews for a linked account
//!
//! The account is always looked up by ID and owner together, so a request
//! for someone else's account is indistinguishable from a missing one. Every
//! credential problem (missing, undecryptable, rejected by Google) surfaces
//! as the same [`CleanupError::CredentialInvalid`].

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use super::models::AccountMessage;
use super::store::AccountStore;
use crate::error::{CleanupError, Result};
use crate::gmail::api::GmailMessage;
use crate::gmail::{header_value, received_at};
use crate::vault::CredentialVault;

/// Most messages returned by [`AccountMessagesService::list_messages`]
pub const MAX_PREVIEW_MESSAGES: usize = 10;

/// Read access to one mailbox's most recent messages
pub trait MessageClient {
    /// Metadata (Subject/From/Date) of up to `max_results` recent messages
    fn list_messages(&self, max_results: usize) -> anyhow::Result<Vec<GmailMessage>>;
}

/// The refresh credential could not be turned into a working client
#[derive(Debug, Error)]
#[error("failed to authenticate Gmail client: {0}")]
pub struct ClientAuthError(pub String);

/// Builds a [`MessageClient`] from a decrypted refresh credential
pub trait MessageClientFactory: Send + Sync {
    fn create(&self, refresh_token: &str) -> Result<Box<dyn MessageClient>, ClientAuthError>;
}

/// Lists recent messages for accounts owned by the current user
#[derive(Clone)]
pub struct AccountMessagesService {
    store: Arc<dyn AccountStore>,
    vault: Arc<CredentialVault>,
    clients: Arc<dyn MessageClientFactory>,
}

impl AccountMessagesService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        vault: Arc<CredentialVault>,
        clients: Arc<dyn MessageClientFactory>,
    ) -> Self {
        Self {
            store,
            vault,
            clients,
        }
    }

    /// Up to [`MAX_PREVIEW_MESSAGES`] recent messages of an owned account
    pub fn list_messages(&self, current_user_id: i64, account_id: i64) -> Result<Vec<AccountMessage>> {
        let account = self
            .store
            .find_account(current_user_id, account_id)
            .map_err(CleanupError::Storage)?
            .ok_or(CleanupError::NotFoundOrNotOwned)?;

        if account.token_encrypted.is_empty() {
            return Err(CleanupError::CredentialInvalid(
                "account refresh token is missing".to_string(),
            ));
        }

        let refresh_token = self
            .vault
            .decrypt(&account.token_encrypted)
            .map_err(|e| CleanupError::CredentialInvalid(e.to_string()))?;

        let client = self.clients.create(&refresh_token).map_err(|e| {
            warn!("Account {} failed to authenticate: {}", account.id, e);
            CleanupError::CredentialInvalid(e.to_string())
        })?;

        let raw = client
            .list_messages(MAX_PREVIEW_MESSAGES)
            .map_err(CleanupError::Provider)?;
        debug!("Fetched {} messages for account {}", raw.len(), account.id);

        Ok(raw
            .iter()
            .take(MAX_PREVIEW_MESSAGES)
            .map(to_account_message)
            .collect())
    }
}

/// Normalize a provider message
///
/// Missing headers read as empty strings; the date falls back from
/// `internalDate` to the `Date` header to the epoch.
pub fn to_account_message(message: &GmailMessage) -> AccountMessage {
    AccountMessage {
        id: message.id.clone(),
        subject: header_value(message, "Subject"),
        from: header_value(message, "From"),
        snippet: message.snippet.clone(),
        date: received_at(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::models::AccountGrant;
    use crate::accounts::store::SqliteAccountStore;
    use crate::gmail::api::{Header, MessagePayload};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClient(Vec<GmailMessage>);

    impl MessageClient for FixedClient {
        fn list_messages(&self, _max_results: usize) -> anyhow::Result<Vec<GmailMessage>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct StubFactory {
        messages: Vec<GmailMessage>,
        reject: bool,
        calls: AtomicUsize,
    }

    impl MessageClientFactory for StubFactory {
        fn create(&self, refresh_token: &str) -> Result<Box<dyn MessageClient>, ClientAuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(refresh_token, "refresh-1");
            if self.reject {
                return Err(ClientAuthError("invalid_grant".to_string()));
            }
            Ok(Box::new(FixedClient(self.messages.clone())))
        }
    }

    fn message(id: &str, internal: Option<&str>, date: Option<&str>) -> GmailMessage {
        let mut headers = vec![Header {
            name: "subject".to_string(),
            value: format!("Subject {id}"),
        }];
        if let Some(date) = date {
            headers.push(Header {
                name: "Date".to_string(),
                value: date.to_string(),
            });
        }
        GmailMessage {
            id: id.to_string(),
            snippet: "snip".to_string(),
            internal_date: internal.map(str::to_string),
            payload: Some(MessagePayload {
                headers: Some(headers),
                mime_type: None,
            }),
            ..Default::default()
        }
    }

    struct Fixture {
        store: Arc<SqliteAccountStore>,
        vault: Arc<CredentialVault>,
        owner: i64,
        account: i64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteAccountStore::open_in_memory().unwrap());
        let vault = Arc::new(CredentialVault::new(&CredentialVault::generate_key()).unwrap());
        let owner = store.create_user("owner@example.com").unwrap().id;
        let account = store
            .upsert_account(&AccountGrant {
                user_id: owner,
                google_sub: "sub-1".to_string(),
                email: "owner@gmail.com".to_string(),
                token_encrypted: vault.encrypt("refresh-1").unwrap(),
                scopes: String::new(),
            })
            .unwrap()
            .id;
        Fixture {
            store,
            vault,
            owner,
            account,
        }
    }

    fn service(fx: &Fixture, factory: Arc<StubFactory>) -> AccountMessagesService {
        AccountMessagesService::new(fx.store.clone(), fx.vault.clone(), factory)
    }

    #[test]
    fn test_date_fallback_chain() {
        let from_internal = to_account_message(&message("a", Some("1704067200000"), None));
        assert_eq!(
            from_internal.date,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );

        let from_header = to_account_message(&message(
            "b",
            None,
            Some("Mon, 01 Jan 2024 02:00:00 +0200"),
        ));
        assert_eq!(from_header.date, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let neither = to_account_message(&message("c", None, None));
        assert_eq!(neither.date, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(neither.subject, "Subject c");
        assert_eq!(neither.from, "");
    }

    #[test]
    fn test_not_owned_makes_no_client_call() {
        let fx = fixture();
        let intruder = fx.store.create_user("intruder@example.com").unwrap().id;
        let factory = Arc::new(StubFactory::default());

        let err = service(&fx, factory.clone())
            .list_messages(intruder, fx.account)
            .unwrap_err();
        assert!(matches!(err, CleanupError::NotFoundOrNotOwned));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_truncates_to_ten() {
        let fx = fixture();
        let factory = Arc::new(StubFactory {
            messages: (0..15).map(|i| message(&i.to_string(), None, None)).collect(),
            ..Default::default()
        });
        let messages = service(&fx, factory).list_messages(fx.owner, fx.account).unwrap();
        assert_eq!(messages.len(), MAX_PREVIEW_MESSAGES);
        assert_eq!(messages[0].id, "0");
    }

    #[test]
    fn test_factory_rejection_is_credential_invalid() {
        let fx = fixture();
        let factory = Arc::new(StubFactory {
            reject: true,
            ..Default::default()
        });
        let err = service(&fx, factory).list_messages(fx.owner, fx.account).unwrap_err();
        assert!(matches!(err, CleanupError::CredentialInvalid(_)));
    }

    #[test]
    fn test_undecryptable_token_is_credential_invalid() {
        let fx = fixture();
        let other_vault = Arc::new(CredentialVault::new(&CredentialVault::generate_key()).unwrap());
        let factory = Arc::new(StubFactory::default());
        let svc = AccountMessagesService::new(fx.store.clone(), other_vault, factory.clone());

        let err = svc.list_messages(fx.owner, fx.account).unwrap_err();
        assert!(matches!(err, CleanupError::CredentialInvalid(_)));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
    }
}
