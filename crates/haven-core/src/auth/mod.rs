//! Supabase auth: session model, persistence seam, and a thin GoTrue client.
//!
//! Authentication itself is delegated to the backend. This module only keeps
//! the current session around so the sync layer knows who owns new records
//! and which bearer token to send.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::util::{normalize_text_option, unix_timestamp_now};

/// Refresh this many seconds before the token actually expires
const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Supabase auth is not configured.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Where a signed-in session survives process restarts
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Shared holder of the current session.
///
/// Empty means guest mode: records get no owner and nothing is synced.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<AuthSession>>>,
}

impl SessionHandle {
    /// A handle with no session (guest mode)
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn signed_in(session: AuthSession) -> Self {
        let handle = Self::default();
        handle.set(Some(session));
        handle
    }

    pub fn set(&self, session: Option<AuthSession>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identity that owns records written now; `None` in guest mode
    pub fn owner_id(&self) -> Option<String> {
        self.current().map(|session| session.user.id)
    }

    /// Bearer token of a session that has not expired
    pub fn access_token(&self) -> Option<String> {
        self.current()
            .filter(|session| !session.is_expired())
            .map(|session| session.access_token)
    }

    pub fn is_guest(&self) -> bool {
        self.current().is_none()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionHandle")
            .field("owner_id", &self.owner_id())
            .finish()
    }
}

#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence> {
    auth_url: String,
    anon_key: String,
    client: Client,
    timeout: Duration,
    store: S,
}

impl<S: SessionPersistence> SupabaseAuthClient<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl Into<String>, store: S) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        let timeout = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);
        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().timeout(timeout).build()?,
            timeout,
            store,
        })
    }

    /// Bound every auth request by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> AuthResult<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        self.timeout = timeout;
        Ok(self)
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Load the persisted session, refreshing it if it has expired.
    ///
    /// A session that can no longer be refreshed is cleared, which drops the
    /// caller back into guest mode.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(AuthError::Http(error)) if error.is_timeout() || error.is_connect() => {
                // Offline: keep the stale session so the user stays signed in
                tracing::debug!("Could not reach auth server to refresh session: {}", error);
                Ok(Some(stored_session))
            }
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    /// Restore the persisted session into `handle`
    pub async fn restore_into(&self, handle: &SessionHandle) -> AuthResult<Option<AuthSession>> {
        let session = self.restore_session().await?;
        handle.set(session.clone());
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );

        let session = self.send_session_request(request).await?;
        self.store.save_session(&session)?;
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({ "refresh_token": refresh_token });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );

        let session = self.send_session_request(request).await?;
        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Revoke the session server-side and forget it locally.
    ///
    /// An already-invalid token still counts as signed out.
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !(status.is_success() || status == StatusCode::UNAUTHORIZED) {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        self.store.clear_session()?;
        Ok(())
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send_session_request(&self, request: RequestBuilder) -> AuthResult<AuthSession> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        let payload = response.json::<TokenResponse>().await?;
        payload.into_session()
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

/// Both values or neither; one without the other is a configuration error
pub fn resolve_optional_supabase_config(
    url: Option<String>,
    anon_key: Option<String>,
) -> AuthResult<Option<(String, String)>> {
    match (normalize_text_option(url), normalize_text_option(anon_key)) {
        (None, None) => Ok(None),
        (Some(url), Some(anon_key)) => Ok(Some((url, anon_key))),
        _ => Err(AuthError::NotConfigured),
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<TokenUser>,
}

impl TokenResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        let expires_at = self.expires_at.or_else(|| {
            self.expires_in
                .map(|expires_in| unix_timestamp_now().saturating_add(expires_in))
        });

        match (self.access_token, self.refresh_token, expires_at, self.user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user: AuthUser {
                        id: user.id,
                        email: user.email,
                    },
                })
            }
            _ => Err(AuthError::Api(
                "Auth response did not include an active session".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<AuthErrorBody>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
