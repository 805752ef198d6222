//! Session store
//!
//! Process-wide authority on who is logged in. Sessions are keyed by the
//! client id carried in the browser cookie. The store subscribes to the
//! identity provider's auth-state feed once, when it is created, and keeps
//! its own state in line with what the provider reports.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::identity::{AuthError, AuthStateChange, IdentityProvider};
use crate::models::{ClientId, Session, SessionHandle};

/// Capacity of the session event channel
const SESSION_EVENT_CAPACITY: usize = 64;

type SessionMap = Arc<RwLock<HashMap<ClientId, Session>>>;

/// Session changes announced to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established { client_id: ClientId },
    /// Tokens were renewed by the provider
    Refreshed { client_id: ClientId },
    /// Logout, provider sign-out or expiry
    Cleared { client_id: ClientId },
}

/// The store's live subscription to the provider feed
struct AuthStateSubscription {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    sessions: SessionMap,
    events: broadcast::Sender<SessionEvent>,
    subscription: Mutex<Option<AuthStateSubscription>>,
}

impl SessionStore {
    /// Create the store and subscribe to the provider's auth-state feed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        let cancel = CancellationToken::new();
        let mut feed = provider.on_auth_state_change();
        let task = {
            let cancel = cancel.clone();
            let sessions = sessions.clone();
            let events = events.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = feed.recv() => match received {
                            Ok(change) => apply_provider_change(&sessions, &events, change),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!("Session store missed {} auth-state changes", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
                tracing::debug!("Auth-state subscription closed");
            })
        };

        Self {
            provider,
            sessions,
            events,
            subscription: Mutex::new(Some(AuthStateSubscription { cancel, task })),
        }
    }

    /// Authenticate with the provider and record the session under a new
    /// client id.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let auth = self.provider.sign_in(email, password).await.map_err(|e| {
            tracing::warn!("Login failed for {}: {}", email, e);
            e
        })?;

        let session = Session {
            client_id: ClientId::generate(),
            handle: auth.handle,
            user_id: auth.user_id,
            email: auth.email,
            id_token: auth.id_token,
            refresh_token: auth.refresh_token,
            expires_at: auth.expires_at,
            created_at: Utc::now(),
        };

        write_lock(&self.sessions).insert(session.client_id.clone(), session.clone());
        tracing::info!("User {} logged in", session.email);
        self.publish(SessionEvent::Established {
            client_id: session.client_id.clone(),
        });

        Ok(session)
    }

    /// Create an account. Never logs the new user in.
    pub async fn signup(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.provider.create_account(email, password).await.map_err(|e| {
            tracing::warn!("Signup failed for {}: {}", email, e);
            e
        })
    }

    /// End the client's session. Without a session this is a no-op.
    pub async fn logout(&self, client_id: &ClientId) -> Result<(), AuthError> {
        let removed = write_lock(&self.sessions).remove(client_id);
        let Some(session) = removed else {
            return Ok(());
        };

        tracing::info!("User {} logged out", session.email);
        self.publish(SessionEvent::Cleared {
            client_id: client_id.clone(),
        });
        self.provider.sign_out(session.handle).await
    }

    /// Snapshot of the client's session, if it has a live one
    pub fn current_session(&self, client_id: &ClientId) -> Option<Session> {
        let session = read_lock(&self.sessions).get(client_id).cloned()?;
        if !session.is_expired() {
            return Some(session);
        }

        let removed = {
            let mut sessions = write_lock(&self.sessions);
            match sessions.get(client_id) {
                Some(current) if current.is_expired() => sessions.remove(client_id),
                _ => None,
            }
        };
        if removed.is_some() {
            tracing::debug!("Dropped expired session for client {}", client_id);
            self.publish(SessionEvent::Cleared {
                client_id: client_id.clone(),
            });
        }
        None
    }

    /// End every session that has expired or is older than `max_age`,
    /// signing each out with the provider. Returns how many were dropped.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let too_old = |s: &Session| {
            (now - s.created_at)
                .to_std()
                .map(|age| age > max_age)
                .unwrap_or(false)
        };
        let stale: Vec<Session> = {
            let mut sessions = write_lock(&self.sessions);
            let ids: Vec<ClientId> = sessions
                .values()
                .filter(|&s| s.is_expired() || too_old(s))
                .map(|s| s.client_id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &stale {
            tracing::debug!("Swept session for client {}", session.client_id);
            self.publish(SessionEvent::Cleared {
                client_id: session.client_id.clone(),
            });
            if let Err(e) = self.provider.sign_out(session.handle).await {
                tracing::warn!("Provider sign-out failed for {}: {}", session.email, e);
            }
        }
        stale.len()
    }

    /// Periodically drop expired and over-age sessions
    pub fn spawn_sweep(
        self: Arc<Self>,
        period: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(Duration::from_millis(10)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = self.sweep(max_age).await;
                        if removed > 0 {
                            tracing::info!("Swept {} stale sessions", removed);
                        }
                    }
                }
            }
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of sessions held
    pub fn len(&self) -> usize {
        read_lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the provider subscription is still running
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|sub| !sub.task.is_finished())
            .unwrap_or(false)
    }

    /// Stop listening to the provider. Safe to call more than once.
    pub async fn teardown(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(sub) = subscription {
            sub.cancel.cancel();
            if let Err(e) = sub.task.await {
                tracing::warn!("Auth-state subscription task failed: {}", e);
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(sub) = self
            .subscription
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            sub.cancel.cancel();
        }
    }
}

fn apply_provider_change(
    sessions: &RwLock<HashMap<ClientId, Session>>,
    events: &broadcast::Sender<SessionEvent>,
    change: AuthStateChange,
) {
    match change {
        AuthStateChange::SignedIn(auth) => {
            tracing::debug!("Provider signed in {}", auth.email);
        }
        AuthStateChange::Refreshed(auth) => {
            let refreshed: Vec<ClientId> = {
                let mut sessions = write_lock(sessions);
                sessions
                    .values_mut()
                    .filter(|s| s.handle == auth.handle)
                    .map(|s| {
                        s.id_token = auth.id_token.clone();
                        s.refresh_token = auth.refresh_token.clone();
                        s.expires_at = auth.expires_at;
                        s.client_id.clone()
                    })
                    .collect()
            };
            for client_id in refreshed {
                let _ = events.send(SessionEvent::Refreshed { client_id });
            }
        }
        AuthStateChange::SignedOut { handle } | AuthStateChange::Expired { handle } => {
            for client_id in remove_by_handle(sessions, handle) {
                tracing::info!("Session for client {} ended by provider", client_id);
                let _ = events.send(SessionEvent::Cleared { client_id });
            }
        }
    }
}

fn remove_by_handle(
    sessions: &RwLock<HashMap<ClientId, Session>>,
    handle: SessionHandle,
) -> Vec<ClientId> {
    let mut sessions = write_lock(sessions);
    let matching: Vec<ClientId> = sessions
        .values()
        .filter(|s| s.handle == handle)
        .map(|s| s.client_id.clone())
        .collect();
    for client_id in &matching {
        sessions.remove(client_id);
    }
    matching
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
