//! Router tests for cleanup-api
//!
//! Google is replaced by in-process fakes; storage is an in-memory SQLite
//! database. Requests go through the full router with `tower::ServiceExt`.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use cleanup::accounts::{
    AccountGrant, AccountMessagesService, AccountStore, ClientAuthError, MessageClient,
    MessageClientFactory, OAuthProvider, SqliteAccountStore, TokenGrant, UserInfo,
};
use cleanup::gmail::api::{GmailMessage, Header, MessagePayload};
use cleanup::CredentialVault;
use cleanup_api::{AppState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const FRONTEND: &str = "http://localhost:3000/accounts";

struct FakeGoogle;

impl OAuthProvider for FakeGoogle {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example/o/oauth2/auth?access_type=offline&state={state}")
    }

    fn exchange_code(&self, code: &str) -> anyhow::Result<TokenGrant> {
        if code == "bad" {
            anyhow::bail!("invalid_grant");
        }
        Ok(TokenGrant {
            access_token: "access".to_string(),
            refresh_token: Some(format!("refresh-{code}")),
            scope: None,
        })
    }

    fn fetch_userinfo(&self, _access_token: &str) -> anyhow::Result<UserInfo> {
        Ok(UserInfo {
            sub: Some("sub-1".to_string()),
            email: Some("user@gmail.com".to_string()),
        })
    }
}

struct FakeMail;

impl MessageClient for FakeMail {
    fn list_messages(&self, _max_results: usize) -> anyhow::Result<Vec<GmailMessage>> {
        Ok(vec![GmailMessage {
            id: "msg-1".to_string(),
            snippet: "preview".to_string(),
            internal_date: Some("1704067200000".to_string()),
            payload: Some(MessagePayload {
                headers: Some(vec![
                    Header {
                        name: "Subject".to_string(),
                        value: "Hello".to_string(),
                    },
                    Header {
                        name: "From".to_string(),
                        value: "sender@example.com".to_string(),
                    },
                ]),
                mime_type: None,
            }),
            ..Default::default()
        }])
    }
}

struct FakeMailFactory;

impl MessageClientFactory for FakeMailFactory {
    fn create(&self, refresh_token: &str) -> Result<Box<dyn MessageClient>, ClientAuthError> {
        if refresh_token == "revoked" {
            return Err(ClientAuthError("invalid_grant".to_string()));
        }
        Ok(Box::new(FakeMail))
    }
}

struct TestApp {
    router: Router,
    store: Arc<SqliteAccountStore>,
    vault: Arc<CredentialVault>,
}

fn test_app() -> TestApp {
    let store = Arc::new(SqliteAccountStore::open_in_memory().unwrap());
    let vault = Arc::new(CredentialVault::new(&CredentialVault::generate_key()).unwrap());
    let state = AppState {
        store: store.clone(),
        vault: vault.clone(),
        oauth: Some(Arc::new(FakeGoogle)),
        messages: AccountMessagesService::new(store.clone(), vault.clone(), Arc::new(FakeMailFactory)),
        frontend_accounts_url: FRONTEND.to_string(),
    };
    TestApp {
        router: router(state),
        store,
        vault,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// Link an account owned by `email`'s user, returning its ID
    fn seed_account(&self, email: &str, refresh_token: &str) -> (i64, i64) {
        let user = self.store.create_user(email).unwrap();
        let account = self
            .store
            .upsert_account(&AccountGrant {
                user_id: user.id,
                google_sub: format!("sub-{email}"),
                email: email.to_string(),
                token_encrypted: self.vault.encrypt(refresh_token).unwrap(),
                scopes: String::new(),
            })
            .unwrap();
        (user.id, account.id)
    }

    /// A session cookie bound to `user_id`
    fn session_for(&self, user_id: i64) -> String {
        let session = self.store.create_session().unwrap();
        self.store.set_session_user(&session.id, user_id).unwrap();
        format!("session={}", session.id)
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let response = app.send("GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_oauth_round_trip_links_account() {
    let app = test_app();

    let start = app.send("GET", "/oauth/google/start", None).await;
    assert_eq!(start.status(), StatusCode::FOUND);
    let cookie = set_cookie(&start).unwrap();
    assert!(cookie.contains("HttpOnly"));
    let cookie = cookie.split(';').next().unwrap().to_string();
    let state = location(&start).rsplit("state=").next().unwrap().to_string();

    let callback = app
        .send(
            "GET",
            &format!("/oauth/google/callback?code=abc&state={state}"),
            Some(&cookie),
        )
        .await;
    assert_eq!(callback.status(), StatusCode::FOUND);
    assert_eq!(location(&callback), FRONTEND);

    let listed = app.send("GET", "/accounts", Some(&cookie)).await;
    assert_eq!(listed.status(), StatusCode::OK);
    let body = body_json(listed).await;
    let accounts = body["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["email"], "user@gmail.com");
    assert_eq!(accounts[0]["google_sub"], "sub-1");
    assert!(accounts[0].get("token_encrypted").is_none());

    // Replaying the same callback is rejected
    let replay = app
        .send(
            "GET",
            &format!("/oauth/google/callback?code=abc&state={state}"),
            Some(&cookie),
        )
        .await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(replay).await,
        json!({ "detail": "OAuth state missing or mismatch." })
    );
}

#[tokio::test]
async fn test_callback_without_state_is_rejected() {
    let app = test_app();
    let start = app.send("GET", "/oauth/google/start", None).await;
    let cookie = set_cookie(&start).unwrap();
    let cookie = cookie.split(';').next().unwrap();

    let response = app
        .send("GET", "/oauth/google/callback?code=abc", Some(cookie))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "detail": "OAuth state missing or mismatch." })
    );
}

#[tokio::test]
async fn test_messages_for_owned_account() {
    let app = test_app();
    let (user_id, account_id) = app.seed_account("owner@example.com", "refresh-1");
    let cookie = app.session_for(user_id);

    let response = app
        .send("GET", &format!("/accounts/{account_id}/messages"), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!([{
            "id": "msg-1",
            "subject": "Hello",
            "from": "sender@example.com",
            "snippet": "preview",
            "date": "2024-01-01T00:00:00Z",
        }])
    );
}

#[tokio::test]
async fn test_messages_for_other_users_account_is_not_found() {
    let app = test_app();
    let (_, account_id) = app.seed_account("owner@example.com", "refresh-1");
    let (stranger, _) = app.seed_account("stranger@example.com", "refresh-2");
    let cookie = app.session_for(stranger);

    let response = app
        .send("GET", &format!("/accounts/{account_id}/messages"), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({ "detail": "Account not found" }));

    let response = app
        .send("GET", "/accounts/999/messages", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_revoked_token_is_bad_request() {
    let app = test_app();
    let (user_id, account_id) = app.seed_account("owner@example.com", "revoked");
    let cookie = app.session_for(user_id);

    let response = app
        .send("GET", &format!("/accounts/{account_id}/messages"), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "detail": "Account token invalid" }));
}

#[tokio::test]
async fn test_delete_account() {
    let app = test_app();
    let (user_id, account_id) = app.seed_account("owner@example.com", "refresh-1");
    let (stranger, _) = app.seed_account("stranger@example.com", "refresh-2");

    let other = app.session_for(stranger);
    let response = app
        .send("DELETE", &format!("/accounts/{account_id}"), Some(&other))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let cookie = app.session_for(user_id);
    let response = app
        .send("DELETE", &format!("/accounts/{account_id}"), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "deleted": true }));

    let response = app
        .send("DELETE", &format!("/accounts/{account_id}"), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_first_request_provisions_local_user() {
    let app = test_app();
    let response = app.send("GET", "/accounts", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).unwrap().starts_with("session="));
    assert_eq!(body_json(response).await, json!({ "accounts": [] }));

    let user = app.store.first_user().unwrap().unwrap();
    assert_eq!(user.email, "local-user@localhost");
}

#[tokio::test]
async fn test_logout_clears_session() {
    let app = test_app();
    let (user_id, _) = app.seed_account("owner@example.com", "refresh-1");
    let cookie = app.session_for(user_id);
    let session_id = cookie.trim_start_matches("session=").to_string();

    let response = app.send("POST", "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).unwrap().contains("Max-Age=0"));
    assert_eq!(body_json(response).await, json!({ "logged_out": true }));
    assert!(app.store.get_session(&session_id).unwrap().is_none());
}

#[tokio::test]
async fn test_start_without_oauth_client_configured() {
    let store = Arc::new(SqliteAccountStore::open_in_memory().unwrap());
    let vault = Arc::new(CredentialVault::new(&CredentialVault::generate_key()).unwrap());
    let app = router(AppState {
        store: store.clone(),
        vault: vault.clone(),
        oauth: None,
        messages: AccountMessagesService::new(store, vault, Arc::new(FakeMailFactory)),
        frontend_accounts_url: FRONTEND.to_string(),
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/google/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({ "detail": "Google OAuth is not configured." })
    );
}
