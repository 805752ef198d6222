//! Firebase identity provider
//!
//! Uses the Identity Toolkit REST API for email/password accounts:
//! - POST /v1/accounts:signUp
//! - POST /v1/accounts:signInWithPassword
//! - POST /v1/token (Secure Token API, refresh)
//!
//! Firebase has no server-side sign-out for password sessions; signing out
//! stops tracking the session and announces it on the feed. Tracked
//! sessions are renewed by [`FirebaseIdentityProvider::spawn_refresher`]
//! shortly before their ID token expires.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{AuthError, AuthSession, AuthStateChange, IdentityProvider, AUTH_EVENT_CAPACITY};
use crate::config::IdentityConfig;
use crate::models::SessionHandle;

/// Sessions expiring within this window get refreshed
const REFRESH_WINDOW_SECS: i64 = 5 * 60;

/// How often the refresher looks for expiring sessions
const REFRESH_TICK_SECS: u64 = 60;

/// Lifetime assumed when the provider sends an unreadable `expiresIn`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// Secure Token API answers in snake_case
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    api_key: String,
    auth_base_url: String,
    token_base_url: String,
    /// Signed-in sessions this process keeps fresh
    tracked: RwLock<HashMap<SessionHandle, AuthSession>>,
    events: broadcast::Sender<AuthStateChange>,
}

impl FirebaseIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            auth_base_url: config.auth_base_url.trim_end_matches('/').to_string(),
            token_base_url: config.token_base_url.trim_end_matches('/').to_string(),
            tracked: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Start the background token refresher. Runs until `cancel` fires.
    pub fn spawn_refresher(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(REFRESH_TICK_SECS));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.refresh_expiring(Duration::seconds(REFRESH_WINDOW_SECS)).await;
                    }
                }
            }
            tracing::debug!("Firebase token refresher stopped");
        })
    }

    /// Refresh every tracked session expiring within `window`.
    ///
    /// Successful refreshes are published as `Refreshed`. A session the
    /// provider refuses to refresh, or one that is already past expiry
    /// when the provider is unreachable, is dropped and published as
    /// `Expired`.
    pub async fn refresh_expiring(&self, window: Duration) {
        let deadline = Utc::now() + window;
        let due: Vec<AuthSession> = read_lock(&self.tracked)
            .values()
            .filter(|s| s.expires_at <= deadline)
            .cloned()
            .collect();

        for session in due {
            match self.exchange_refresh_token(&session).await {
                Ok(refreshed) => {
                    let still_tracked = {
                        let mut tracked = write_lock(&self.tracked);
                        match tracked.get_mut(&session.handle) {
                            Some(entry) => {
                                *entry = refreshed.clone();
                                true
                            }
                            None => false,
                        }
                    };
                    if still_tracked {
                        tracing::debug!("Refreshed session {}", session.handle);
                        self.publish(AuthStateChange::Refreshed(refreshed));
                    }
                }
                Err(AuthError::Network(e)) if session.expires_at > Utc::now() => {
                    tracing::warn!("Token refresh for {} failed, will retry: {}", session.handle, e);
                }
                Err(e) => {
                    tracing::warn!("Token refresh for {} failed: {}", session.handle, e);
                    if write_lock(&self.tracked).remove(&session.handle).is_some() {
                        self.publish(AuthStateChange::Expired {
                            handle: session.handle,
                        });
                    }
                }
            }
        }
    }

    async fn exchange_refresh_token(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        let url = format!("{}/v1/token", self.token_base_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(&body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("Malformed token response: {}", e)))?;

        Ok(AuthSession {
            handle: session.handle,
            user_id: session.user_id.clone(),
            email: session.email.clone(),
            id_token: token.id_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(parse_expires_in(&token.expires_in)),
        })
    }

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<PasswordResponse, AuthError> {
        let url = format!("{}/v1/accounts:{}", self.auth_base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(&body));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("Malformed {} response: {}", endpoint, e)))
    }

    fn publish(&self, change: AuthStateChange) {
        let _ = self.events.send(change);
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<(), AuthError> {
        // signUp also returns tokens; the account is created but no session
        // is kept, the user signs in separately.
        self.password_call("signUp", email, password).await?;
        tracing::info!("Created account for {}", email);
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let body = self.password_call("signInWithPassword", email, password).await?;

        let session = AuthSession {
            handle: SessionHandle::new(),
            user_id: body.local_id,
            email: body.email.unwrap_or_else(|| email.to_string()),
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: Utc::now() + Duration::seconds(parse_expires_in(&body.expires_in)),
        };

        write_lock(&self.tracked).insert(session.handle, session.clone());
        self.publish(AuthStateChange::SignedIn(session.clone()));

        Ok(session)
    }

    async fn sign_out(&self, handle: SessionHandle) -> Result<(), AuthError> {
        if write_lock(&self.tracked).remove(&handle).is_some() {
            self.publish(AuthStateChange::SignedOut { handle });
        }
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

fn parse_expires_in(value: &str) -> i64 {
    value.trim().parse().unwrap_or(DEFAULT_EXPIRES_IN_SECS)
}

/// Map a Firebase error body to an [`AuthError`]
fn error_from_body(body: &str) -> AuthError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => error_from_message(&envelope.error.message),
        Err(_) => AuthError::Provider(format!("Unexpected error response: {}", body)),
    }
}

/// Firebase messages look like `CODE` or `CODE : human readable detail`
fn error_from_message(message: &str) -> AuthError {
    let (code, detail) = match message.split_once(" : ") {
        Some((code, detail)) => (code.trim(), Some(detail.trim())),
        None => (message.trim(), None),
    };

    match code {
        "EMAIL_EXISTS" => AuthError::AccountExists,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            AuthError::InvalidCredentials
        }
        "WEAK_PASSWORD" => AuthError::Rejected(
            detail
                .unwrap_or("Password should be at least 6 characters")
                .to_string(),
        ),
        "INVALID_EMAIL" => AuthError::Rejected("Invalid email address".to_string()),
        "MISSING_PASSWORD" => AuthError::Rejected("Password is required".to_string()),
        other => AuthError::Provider(other.to_string()),
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
