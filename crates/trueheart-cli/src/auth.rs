//! Session token persistence in the OS keychain.
//!
//! Tokens are stored per profile. `TRUEHEART_SESSION_TOKEN` overrides the
//! stored value, which is handy for CI and scripted use.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;
use trueheart_core::auth::SessionToken;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "trueheart-cli";
pub const SESSION_TOKEN_ENV: &str = "TRUEHEART_SESSION_TOKEN";

/// Where a resolved session token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Keychain,
}

#[derive(Clone)]
struct TokenStore {
    username: String,
}

impl TokenStore {
    fn new(profile_name: &str) -> Self {
        Self {
            username: format!("session_token:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(keychain_error)
    }

    #[cfg(not(test))]
    fn load(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(keychain_error(error)),
        }
    }

    #[cfg(test)]
    fn load(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store().lock().map_err(keychain_error)?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    fn save(&self, raw: &str) -> Result<(), CliError> {
        self.entry()?.set_password(raw).map_err(keychain_error)
    }

    #[cfg(test)]
    fn save(&self, raw: &str) -> Result<(), CliError> {
        let mut guard = Self::test_store().lock().map_err(keychain_error)?;
        guard.insert(self.username.clone(), raw.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn clear(&self) -> Result<bool, CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(error) => Err(keychain_error(error)),
        }
    }

    #[cfg(test)]
    fn clear(&self) -> Result<bool, CliError> {
        let mut guard = Self::test_store().lock().map_err(keychain_error)?;
        Ok(guard.remove(&self.username).is_some())
    }
}

fn keychain_error(error: impl std::fmt::Display) -> CliError {
    CliError::Auth(format!("secure storage unavailable: {error}"))
}

pub fn store_session_token(profile_name: &str, token: &SessionToken) -> Result<(), CliError> {
    TokenStore::new(profile_name).save(token.expose())
}

pub fn load_stored_session_token(profile_name: &str) -> Result<Option<SessionToken>, CliError> {
    Ok(TokenStore::new(profile_name)
        .load()?
        .and_then(SessionToken::new))
}

/// Remove the stored token; returns whether one existed.
pub fn clear_stored_session_token(profile_name: &str) -> Result<bool, CliError> {
    TokenStore::new(profile_name).clear()
}

pub fn resolve_session_token(
    profile_name: &str,
) -> Result<Option<(SessionToken, TokenSource)>, CliError> {
    if let Some(token) = std::env::var(SESSION_TOKEN_ENV)
        .ok()
        .and_then(SessionToken::new)
    {
        return Ok(Some((token, TokenSource::Environment)));
    }
    Ok(load_stored_session_token(profile_name)?.map(|token| (token, TokenSource::Keychain)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_tokens_are_scoped_per_profile() {
        let token = SessionToken::new("token-for-work").unwrap();
        store_session_token("auth-test-work", &token).unwrap();

        assert_eq!(
            load_stored_session_token("auth-test-work").unwrap(),
            Some(token)
        );
        assert_eq!(load_stored_session_token("auth-test-home").unwrap(), None);

        assert!(clear_stored_session_token("auth-test-work").unwrap());
        assert!(!clear_stored_session_token("auth-test-work").unwrap());
        assert_eq!(load_stored_session_token("auth-test-work").unwrap(), None);
    }
}
