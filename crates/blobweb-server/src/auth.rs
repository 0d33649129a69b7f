use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use blobweb_rpc::Session;
use blobweb_store::{LoadOptions, Store};
use tracing::debug;

use crate::error::{ServerError, ServerResult};

/// What the client presented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Read an `Authorization: Bearer <token>` header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| Self::Bearer(token.trim().to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

/// Resolves the session an RPC runs under.
///
/// `Ok(None)` means there is no session at all, which only the `none` tier
/// admits. An error rejects the request with 401.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self, credentials: &Credentials) -> ServerResult<Option<Session>>;
}

/// Every request is anonymous.
pub struct AnonymousSessions;

#[async_trait]
impl SessionProvider for AnonymousSessions {
    async fn session(&self, _credentials: &Credentials) -> ServerResult<Option<Session>> {
        Ok(Some(Session::anonymous()))
    }
}

/// Static bearer tokens mapped to usernames.
///
/// With a store attached, admin and active flags come from the user's
/// record; an inactive user is not authenticated. Without one, every known
/// token is a plain user.
pub struct TokenSessions {
    tokens: HashMap<String, String>,
    store: Option<Arc<Store>>,
}

impl TokenSessions {
    pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
            store: None,
        }
    }

    pub fn from_config(tokens: &BTreeMap<String, String>) -> Self {
        Self::new(tokens.iter().map(|(t, u)| (t.clone(), u.clone())))
    }

    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    fn session_for(&self, username: &str) -> ServerResult<Session> {
        let Some(store) = &self.store else {
            return Ok(Session::user(username));
        };
        let session = match store.load_user_with(username, LoadOptions::tolerant())? {
            Some(user) if !user.is_active => Session {
                is_authenticated: false,
                ..Session::user(username)
            },
            Some(user) if user.is_admin => Session::admin(username),
            _ => Session::user(username),
        };
        Ok(session)
    }
}

#[async_trait]
impl SessionProvider for TokenSessions {
    async fn session(&self, credentials: &Credentials) -> ServerResult<Option<Session>> {
        match credentials {
            Credentials::Anonymous => Ok(Some(Session::anonymous())),
            Credentials::Bearer(token) => {
                let username = self
                    .tokens
                    .get(token)
                    .ok_or_else(|| ServerError::AuthFailed("unknown token".into()))?;
                let session = self.session_for(username)?;
                debug!(user = %session.username, admin = session.is_admin, "resolved session");
                Ok(Some(session))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use blobweb_store::{InMemoryBackend, SaveOptions, StoreOptions, User};

    fn tokens() -> Vec<(String, String)> {
        vec![
            ("root-token".into(), "root".into()),
            ("alice-token".into(), "alice".into()),
            ("gone-token".into(), "gone".into()),
        ]
    }

    #[test]
    fn bearer_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(Credentials::from_headers(&headers), Credentials::Bearer("abc123".into()));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);
    }

    #[tokio::test]
    async fn anonymous_sessions() {
        let session = AnonymousSessions
            .session(&Credentials::Bearer("x".into()))
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_anonymous);
    }

    #[tokio::test]
    async fn tokens_without_store() {
        let sessions = TokenSessions::new(tokens());
        let s = sessions
            .session(&Credentials::Bearer("root-token".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.username, "root");
        assert!(s.is_named());
        assert!(!s.is_admin);

        let err = sessions.session(&Credentials::Bearer("nope".into())).await.unwrap_err();
        assert!(matches!(err, ServerError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn flags_come_from_user_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::with_backend(
            Box::new(InMemoryBackend::new()),
            "memory://",
            StoreOptions::default().with_tempfolder(dir.path()),
        )
        .unwrap();
        store.save_user(&User::new("root").with_admin(true), SaveOptions::default()).unwrap();
        let mut gone = User::new("gone");
        gone.is_active = false;
        store.save_user(&gone, SaveOptions::default()).unwrap();

        let sessions = TokenSessions::new(tokens()).with_store(Arc::new(store));
        let session = |token: &'static str| {
            let sessions = &sessions;
            async move {
                sessions
                    .session(&Credentials::Bearer(token.into()))
                    .await
                    .unwrap()
                    .unwrap()
            }
        };

        assert!(session("root-token").await.is_admin);
        let alice = session("alice-token").await;
        assert!(alice.is_named());
        assert!(!alice.is_admin);
        assert!(!session("gone-token").await.is_named());
    }
}
