//! In-process identity provider
//!
//! Keeps accounts in memory with Argon2 password hashes. Nothing survives a
//! restart; intended for local development and tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

use super::{AuthError, AuthSession, AuthStateChange, IdentityProvider, AUTH_EVENT_CAPACITY};
use crate::models::SessionHandle;
use crate::services::password::{hash_password, verify_password};

/// Minimum password length, same rule as Firebase
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    user_id: String,
    email: String,
    password_hash: String,
}

pub struct MemoryIdentityProvider {
    /// Accounts keyed by lowercased email
    accounts: RwLock<HashMap<String, Account>>,
    /// Open sessions
    sessions: RwLock<HashMap<SessionHandle, AuthSession>>,
    events: broadcast::Sender<AuthStateChange>,
    session_ttl: Duration,
}

impl MemoryIdentityProvider {
    pub fn new(session_ttl_secs: u64) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            accounts: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            events,
            session_ttl: Duration::seconds(session_ttl_secs as i64),
        }
    }

    /// Drop a session on the provider side and announce it as expired
    pub fn expire(&self, handle: SessionHandle) {
        let removed = write_lock(&self.sessions).remove(&handle);
        if removed.is_some() {
            self.publish(AuthStateChange::Expired { handle });
        }
    }

    /// Issue fresh tokens for an open session
    pub fn refresh(&self, handle: SessionHandle) -> Option<AuthSession> {
        let refreshed = {
            let mut sessions = write_lock(&self.sessions);
            let session = sessions.get_mut(&handle)?;
            session.id_token = uuid::Uuid::new_v4().to_string();
            session.expires_at = Utc::now() + self.session_ttl;
            session.clone()
        };
        self.publish(AuthStateChange::Refreshed(refreshed.clone()));
        Some(refreshed)
    }

    /// Number of sessions the provider considers open
    pub fn open_sessions(&self) -> usize {
        read_lock(&self.sessions).len()
    }

    fn publish(&self, change: AuthStateChange) {
        // No subscribers is fine
        let _ = self.events.send(change);
    }

    fn validate(email: &str, password: &str) -> Result<(), AuthError> {
        if !email.contains('@') {
            return Err(AuthError::Rejected("Invalid email address".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Rejected(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<(), AuthError> {
        Self::validate(email, password)?;
        let key = email.trim().to_lowercase();

        if read_lock(&self.accounts).contains_key(&key) {
            return Err(AuthError::AccountExists);
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let mut accounts = write_lock(&self.accounts);
        if accounts.contains_key(&key) {
            return Err(AuthError::AccountExists);
        }
        accounts.insert(
            key,
            Account {
                user_id: uuid::Uuid::new_v4().simple().to_string(),
                email: email.trim().to_string(),
                password_hash,
            },
        );

        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let key = email.trim().to_lowercase();
        let (user_id, stored_email, password_hash) = {
            let accounts = read_lock(&self.accounts);
            let account = accounts.get(&key).ok_or(AuthError::InvalidCredentials)?;
            (
                account.user_id.clone(),
                account.email.clone(),
                account.password_hash.clone(),
            )
        };

        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        let session = AuthSession {
            handle: SessionHandle::new(),
            user_id,
            email: stored_email,
            id_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: uuid::Uuid::new_v4().to_string(),
            expires_at: Utc::now() + self.session_ttl,
        };

        write_lock(&self.sessions).insert(session.handle, session.clone());
        self.publish(AuthStateChange::SignedIn(session.clone()));

        Ok(session)
    }

    async fn sign_out(&self, handle: SessionHandle) -> Result<(), AuthError> {
        let removed = write_lock(&self.sessions).remove(&handle);
        if removed.is_some() {
            self.publish(AuthStateChange::SignedOut { handle });
        }
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_account_then_sign_in() {
        let provider = MemoryIdentityProvider::new(3600);
        provider
            .create_account("reader@example.com", "secret123")
            .await
            .unwrap();

        let session = provider
            .sign_in("Reader@Example.com", "secret123")
            .await
            .unwrap();

        assert_eq!(session.email, "reader@example.com");
        assert!(session.expires_at > Utc::now());
        assert_eq!(provider.open_sessions(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let provider = MemoryIdentityProvider::new(3600);
        provider.create_account("a@example.com", "secret123").await.unwrap();

        let result = provider.create_account("A@example.com", "other-pass").await;
        assert_eq!(result, Err(AuthError::AccountExists));
    }

    #[tokio::test]
    async fn test_weak_password_and_bad_email_rejected() {
        let provider = MemoryIdentityProvider::new(3600);

        assert!(matches!(
            provider.create_account("a@example.com", "123").await,
            Err(AuthError::Rejected(_))
        ));
        assert!(matches!(
            provider.create_account("not-an-email", "secret123").await,
            Err(AuthError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let provider = MemoryIdentityProvider::new(3600);
        provider.create_account("a@example.com", "secret123").await.unwrap();

        assert_eq!(
            provider.sign_in("a@example.com", "wrong-pass").await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            provider.sign_in("nobody@example.com", "secret123").await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(provider.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_feed_reports_sign_in_and_sign_out() {
        let provider = MemoryIdentityProvider::new(3600);
        let mut feed = provider.on_auth_state_change();
        provider.create_account("a@example.com", "secret123").await.unwrap();

        let session = provider.sign_in("a@example.com", "secret123").await.unwrap();
        provider.sign_out(session.handle).await.unwrap();
        // Second sign-out is a no-op and publishes nothing
        provider.sign_out(session.handle).await.unwrap();

        assert_eq!(feed.recv().await.unwrap(), AuthStateChange::SignedIn(session.clone()));
        assert_eq!(
            feed.recv().await.unwrap(),
            AuthStateChange::SignedOut { handle: session.handle }
        );
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_keeps_handle() {
        let provider = MemoryIdentityProvider::new(3600);
        provider.create_account("a@example.com", "secret123").await.unwrap();
        let session = provider.sign_in("a@example.com", "secret123").await.unwrap();

        let refreshed = provider.refresh(session.handle).unwrap();

        assert_eq!(refreshed.handle, session.handle);
        assert_ne!(refreshed.id_token, session.id_token);
        assert!(provider.refresh(SessionHandle::new()).is_none());
    }
}
