//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one browser, carried in the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh random client id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle the identity provider assigns to one signed-in session.
///
/// Stays the same across token refreshes, so provider events can be
/// matched back to the sessions they concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(uuid::Uuid);

impl SessionHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated identity of one client, as held by the session store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Browser this session belongs to (cookie value)
    pub client_id: ClientId,
    /// Provider-side handle
    pub handle: SessionHandle,
    /// Provider user identifier
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub id_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    /// Expiration timestamp, as reported by the provider
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            client_id: ClientId::generate(),
            handle: SessionHandle::new(),
            user_id: "uid-1".to_string(),
            email: "reader@example.com".to_string(),
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_expiry() {
        assert!(!session_expiring_at(Utc::now() + Duration::hours(1)).is_expired());
        assert!(session_expiring_at(Utc::now() - Duration::seconds(1)).is_expired());
    }

    #[test]
    fn test_tokens_not_serialized() {
        let json = serde_json::to_value(session_expiring_at(Utc::now())).unwrap();
        assert!(json.get("id_token").is_none());
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["email"], "reader@example.com");
    }

    #[test]
    fn test_generated_client_ids_differ() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }
}
