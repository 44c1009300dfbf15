//! Cookie-backed server-side sessions

use anyhow::Result;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use cleanup::accounts::{AccountStore, User};

pub const SESSION_COOKIE: &str = "session";

/// Session resolved for one request
#[derive(Debug, Clone)]
pub struct RequestSession {
    pub id: String,
    pub user_id: Option<i64>,
    /// Created for this request; the cookie must be sent back
    pub is_new: bool,
}

impl RequestSession {
    /// Load the session named by the cookie, or start a new one
    pub fn resolve(store: &dyn AccountStore, headers: &HeaderMap) -> Result<Self> {
        if let Some(id) = cookie_value(headers, SESSION_COOKIE)
            && let Some(session) = store.get_session(&id)?
        {
            return Ok(Self {
                id: session.id,
                user_id: session.user_id,
                is_new: false,
            });
        }
        let session = store.create_session()?;
        Ok(Self {
            id: session.id,
            user_id: None,
            is_new: true,
        })
    }

    /// The session's user, provisioning one and binding it when needed
    pub fn current_user(&mut self, store: &dyn AccountStore) -> Result<User> {
        let user = store.current_user(self.user_id)?;
        if self.user_id != Some(user.id) {
            store.set_session_user(&self.id, user.id)?;
            self.user_id = Some(user.id);
        }
        Ok(user)
    }

    /// Attach the session cookie to `response` when it was just created
    pub fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.is_new
            && let Ok(value) = HeaderValue::from_str(&set_cookie(&self.id))
        {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        response
    }
}

pub fn set_cookie(session_id: &str) -> String {
    format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax")
}

/// Expires the session cookie
pub const CLEAR_COOKIE: &str = "session=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax";

/// Value of the cookie `name` from the `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleanup::accounts::SqliteAccountStore;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_cookie_value() {
        let h = headers("theme=dark; session=abc123; other=x");
        assert_eq!(cookie_value(&h, "session").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&h, "missing"), None);
        assert_eq!(cookie_value(&headers("session="), "session"), None);
    }

    #[test]
    fn test_unknown_cookie_starts_new_session() {
        let store = SqliteAccountStore::open_in_memory().unwrap();
        let session = RequestSession::resolve(&store, &headers("session=forged")).unwrap();
        assert!(session.is_new);
        assert_ne!(session.id, "forged");

        let again =
            RequestSession::resolve(&store, &headers(&format!("session={}", session.id))).unwrap();
        assert!(!again.is_new);
        assert_eq!(again.id, session.id);
    }

    #[test]
    fn test_current_user_is_bound() {
        let store = SqliteAccountStore::open_in_memory().unwrap();
        let mut session = RequestSession::resolve(&store, &HeaderMap::new()).unwrap();
        let user = session.current_user(&store).unwrap();
        assert_eq!(session.user_id, Some(user.id));
        assert_eq!(
            store.get_session(&session.id).unwrap().unwrap().user_id,
            Some(user.id)
        );
    }
}
