//! Identity provider boundary
//!
//! Authentication is delegated to an external provider. Anything that can
//! create an account, sign in, sign out and publish auth-state changes can
//! back the session store:
//! - `FirebaseIdentityProvider` talks to the Firebase Identity Toolkit REST API
//! - `MemoryIdentityProvider` keeps accounts in process (development, tests)

pub mod firebase;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::models::SessionHandle;

pub use firebase::FirebaseIdentityProvider;
pub use memory::MemoryIdentityProvider;

/// Capacity of the auth-state broadcast channel
pub(crate) const AUTH_EVENT_CAPACITY: usize = 64;

/// Authentication failures surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Wrong email/password, unknown or disabled account
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Signup with an email that already has an account
    #[error("An account with this email already exists")]
    AccountExists,

    /// Provider refused the input (weak password, malformed email)
    #[error("{0}")]
    Rejected(String),

    /// Provider unreachable
    #[error("Network error while contacting the identity provider: {0}")]
    Network(String),

    /// Any other provider failure
    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// A signed-in session as issued by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub handle: SessionHandle,
    pub user_id: String,
    pub email: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Changes pushed by the provider on its auth-state feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStateChange {
    SignedIn(AuthSession),
    /// Tokens were renewed; the handle is unchanged
    Refreshed(AuthSession),
    SignedOut { handle: SessionHandle },
    /// The provider gave up on the session (refresh failed, revoked)
    Expired { handle: SessionHandle },
}

impl AuthStateChange {
    pub fn handle(&self) -> SessionHandle {
        match self {
            Self::SignedIn(session) | Self::Refreshed(session) => session.handle,
            Self::SignedOut { handle } | Self::Expired { handle } => *handle,
        }
    }
}

/// External identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a new credential. Does not sign in.
    async fn create_account(&self, email: &str, password: &str) -> Result<(), AuthError>;

    /// Verify credentials and open a session
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Close a session. Unknown handles are ignored.
    async fn sign_out(&self, handle: SessionHandle) -> Result<(), AuthError>;

    /// Subscribe to the provider's auth-state feed.
    ///
    /// Dropping the receiver unsubscribes.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange>;
}
