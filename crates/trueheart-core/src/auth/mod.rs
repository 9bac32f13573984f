//! Credential provider seam.
//!
//! Login, registration and token refresh live outside this crate. The sync
//! engine only needs to know whether a session is held, its bearer token, and
//! when that changes.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Opaque bearer token for the remote store.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token; blank tokens are rejected.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SessionToken([REDACTED])")
    }
}

/// Source of the current session credential.
pub trait CredentialProvider: Send + Sync {
    fn session_token(&self) -> Option<SessionToken>;

    fn is_authenticated(&self) -> bool {
        self.session_token().is_some()
    }
}

/// Receiver side of `authChanged` notifications.
pub type AuthChanges = watch::Receiver<Option<SessionToken>>;

/// Shared, observable session state.
///
/// Clones share the same session; every `sign_in`/`sign_out` is observed by
/// subscribers.
#[derive(Clone)]
pub struct AuthState {
    sender: Arc<watch::Sender<Option<SessionToken>>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl AuthState {
    pub fn signed_out() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn signed_in(token: SessionToken) -> Self {
        let state = Self::signed_out();
        state.sender.send_replace(Some(token));
        state
    }

    pub fn sign_in(&self, token: SessionToken) {
        self.sender.send_replace(Some(token));
        tracing::info!("Session credential installed");
    }

    pub fn sign_out(&self) {
        if self.sender.send_replace(None).is_some() {
            tracing::info!("Session credential cleared");
        }
    }

    pub fn subscribe(&self) -> AuthChanges {
        self.sender.subscribe()
    }
}

impl CredentialProvider for AuthState {
    fn session_token(&self) -> Option<SessionToken> {
        self.sender.borrow().clone()
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthState")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_rejects_blank() {
        assert!(SessionToken::new("  ").is_none());
        assert_eq!(SessionToken::new(" abc ").unwrap().expose(), "abc");
    }

    #[test]
    fn session_token_debug_redacts_value() {
        let token = SessionToken::new("secret-token").unwrap();
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn auth_state_notifies_subscribers() {
        let state = AuthState::signed_out();
        let mut changes = state.subscribe();
        assert!(!state.is_authenticated());

        state.sign_in(SessionToken::new("token").unwrap());
        changes.changed().await.unwrap();
        assert!(changes.borrow_and_update().is_some());
        assert!(state.clone().is_authenticated());

        state.sign_out();
        changes.changed().await.unwrap();
        assert!(changes.borrow().is_none());
    }
}
