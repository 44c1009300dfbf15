//! Integration tests for account linking and message previews
//!
//! The Google side is replaced by in-process fakes; storage is a real
//! SQLite database in a temporary directory.

use cleanup::accounts::oauth::{begin_authorization, complete_authorization};
use cleanup::accounts::{
    AccountMessagesService, AccountStore, ClientAuthError, MessageClient, MessageClientFactory,
    OAuthError, OAuthProvider, SqliteAccountStore, TokenGrant, UserInfo,
};
use cleanup::gmail::api::{GmailMessage, Header, MessagePayload};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use cleanup::{CleanupError, CredentialVault};
use std::sync::Arc;
use tempfile::TempDir;

struct FakeGoogle;

impl OAuthProvider for FakeGoogle {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example/o/oauth2/auth?state={state}")
    }

    fn exchange_code(&self, code: &str) -> anyhow::Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: format!("access-{code}"),
            refresh_token: Some(format!("refresh-{code}")),
            scope: Some("https://www.googleapis.com/auth/gmail.modify".to_string()),
        })
    }

    fn fetch_userinfo(&self, access_token: &str) -> anyhow::Result<UserInfo> {
        let code = access_token.trim_start_matches("access-");
        Ok(UserInfo {
            sub: Some(format!("sub-{code}")),
            email: Some(format!("{code}@gmail.com")),
        })
    }
}

/// Serves `count` messages to holders of a refresh token it recognizes
struct FakeMailFactory {
    count: usize,
}

struct FakeMail(Vec<GmailMessage>);

impl MessageClient for FakeMail {
    fn list_messages(&self, _max_results: usize) -> anyhow::Result<Vec<GmailMessage>> {
        Ok(self.0.clone())
    }
}

impl MessageClientFactory for FakeMailFactory {
    fn create(&self, refresh_token: &str) -> Result<Box<dyn MessageClient>, ClientAuthError> {
        if !refresh_token.starts_with("refresh-") {
            return Err(ClientAuthError("invalid_grant".to_string()));
        }
        let messages = (0..self.count)
            .map(|i| GmailMessage {
                id: format!("msg-{i}"),
                snippet: format!("snippet {i}"),
                internal_date: Some(format!("{}", 1_704_067_200_000i64 + i as i64 * 1000)),
                payload: Some(MessagePayload {
                    headers: Some(vec![
                        Header {
                            name: "Subject".to_string(),
                            value: format!("Hello {i}"),
                        },
                        Header {
                            name: "From".to_string(),
                            value: "sender@example.com".to_string(),
                        },
                    ]),
                    mime_type: None,
                }),
                ..Default::default()
            })
            .collect();
        Ok(Box::new(FakeMail(messages)))
    }
}

fn state_from(url: &str) -> String {
    url.rsplit("state=").next().unwrap_or_default().to_string()
}

fn link(store: &SqliteAccountStore, vault: &CredentialVault, session_id: &str, code: &str) -> i64 {
    let url = begin_authorization(store, &FakeGoogle, session_id).unwrap();
    let state = state_from(&url);
    complete_authorization(store, &FakeGoogle, vault, session_id, code, Some(&state))
        .unwrap()
        .id
}

#[test]
fn test_link_then_preview_messages() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteAccountStore::open(dir.path().join("app.db")).unwrap());
    let vault = Arc::new(CredentialVault::new(&CredentialVault::generate_key()).unwrap());

    let session = store.create_session().unwrap();
    let account_id = link(&store, &vault, &session.id, "alice");

    let user_id = store
        .get_session(&session.id)
        .unwrap()
        .and_then(|s| s.user_id)
        .unwrap();
    let accounts = store.list_accounts(user_id).unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].email, "alice@gmail.com");
    assert_ne!(accounts[0].token_encrypted, "refresh-alice");

    let service = AccountMessagesService::new(
        store.clone(),
        vault.clone(),
        Arc::new(FakeMailFactory { count: 25 }),
    );
    let messages = service.list_messages(user_id, account_id).unwrap();
    assert_eq!(messages.len(), 10);
    assert_eq!(messages[0].subject, "Hello 0");
    assert_eq!(messages[0].from, "sender@example.com");
    assert_eq!(messages[0].date.to_rfc3339(), "2024-01-01T00:00:00+00:00");
}

#[test]
fn test_relinking_same_google_identity_updates_in_place() {
    let store = SqliteAccountStore::open_in_memory().unwrap();
    let vault = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
    let session = store.create_session().unwrap();

    let first = link(&store, &vault, &session.id, "bob");
    let second = link(&store, &vault, &session.id, "bob");
    assert_eq!(first, second);

    let user_id = store.first_user().unwrap().unwrap().id;
    assert_eq!(store.list_accounts(user_id).unwrap().len(), 1);
}

#[test]
fn test_callback_state_is_single_use() {
    let store = SqliteAccountStore::open_in_memory().unwrap();
    let vault = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
    let session = store.create_session().unwrap();

    let url = begin_authorization(&store, &FakeGoogle, &session.id).unwrap();
    let state = state_from(&url);
    complete_authorization(&store, &FakeGoogle, &vault, &session.id, "carol", Some(&state))
        .unwrap();

    let replay =
        complete_authorization(&store, &FakeGoogle, &vault, &session.id, "carol", Some(&state));
    assert!(matches!(replay, Err(OAuthError::StateMismatch)));

    let missing = complete_authorization(&store, &FakeGoogle, &vault, &session.id, "carol", None);
    assert!(matches!(missing, Err(OAuthError::StateMismatch)));
}

#[test]
fn test_other_users_cannot_see_account() {
    let store = Arc::new(SqliteAccountStore::open_in_memory().unwrap());
    let vault = Arc::new(CredentialVault::new(&CredentialVault::generate_key()).unwrap());
    let session = store.create_session().unwrap();
    let account_id = link(&store, &vault, &session.id, "dave");
    let owner = store.first_user().unwrap().unwrap().id;
    let stranger = store.create_user("stranger@example.com").unwrap().id;

    let service =
        AccountMessagesService::new(store.clone(), vault, Arc::new(FakeMailFactory { count: 1 }));
    let err = service.list_messages(stranger, account_id).unwrap_err();
    assert!(matches!(err, CleanupError::NotFoundOrNotOwned));

    assert!(!store.delete_account(stranger, account_id).unwrap());
    assert!(store.delete_account(owner, account_id).unwrap());
    let err = service.list_messages(owner, account_id).unwrap_err();
    assert!(matches!(err, CleanupError::NotFoundOrNotOwned));
}

#[test]
fn test_rotated_key_reports_invalid_credential() {
    let store = Arc::new(SqliteAccountStore::open_in_memory().unwrap());
    let old_vault = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
    let session = store.create_session().unwrap();
    let account_id = link(&store, &old_vault, &session.id, "erin");
    let owner = store.first_user().unwrap().unwrap().id;

    let new_vault = Arc::new(CredentialVault::new(&CredentialVault::generate_key()).unwrap());
    let service = AccountMessagesService::new(
        store.clone(),
        new_vault,
        Arc::new(FakeMailFactory { count: 1 }),
    );
    let err = service.list_messages(owner, account_id).unwrap_err();
    assert!(matches!(err, CleanupError::CredentialInvalid(_)));
}

#[test]
fn test_vault_round_trip_and_tamper() {
    let vault = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
    let token = vault.encrypt("1//refresh-token").unwrap();
    assert_eq!(vault.decrypt(&token).unwrap(), "1//refresh-token");

    let mut raw = URL_SAFE.decode(&token).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    let tampered = URL_SAFE.encode(raw);
    assert!(vault.decrypt(&tampered).is_err());

    assert!(CredentialVault::new("too-short").is_err());
}
