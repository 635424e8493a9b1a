//! CLI Supabase session helpers with secure keychain persistence.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use haven_core::auth::{
    resolve_optional_supabase_config, AuthResult, SessionPersistence, SupabaseAuthClient,
};
pub use haven_core::auth::{AuthError, AuthSession};
use haven_core::config::HavenConfig;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "haven-cli";

/// Keychain slot for one app's Supabase session
#[derive(Clone)]
pub struct SessionStore {
    username: String,
}

impl SessionStore {
    pub fn new(app_name: &str) -> Self {
        Self {
            username: format!("supabase_session:{app_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for SessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        match guard.get(&self.username) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Auth client for the configured project, or `None` in a local-only setup
pub fn auth_client(config: &HavenConfig) -> AuthResult<Option<SupabaseAuthClient<SessionStore>>> {
    let Some((url, anon_key)) = resolve_optional_supabase_config(
        config.supabase_url.clone(),
        config.supabase_anon_key.clone(),
    )?
    else {
        return Ok(None);
    };

    let client = SupabaseAuthClient::new(url, anon_key, SessionStore::new(&config.app_name))?
        .with_timeout(config.request_timeout())?;
    Ok(Some(client))
}

pub fn load_stored_session(app_name: &str) -> AuthResult<Option<AuthSession>> {
    SessionStore::new(app_name).load_session()
}

pub fn clear_stored_session(app_name: &str) -> AuthResult<()> {
    SessionStore::new(app_name).clear_session()
}
