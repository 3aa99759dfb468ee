//! Auth Session Management
//!
//! Opaque bearer tokens mapped to user IDs. Stands in for the external
//! identity provider: a token is issued at signup/login and revoked at logout.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::user::UserId;

/// Default token lifetime
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

/// Opaque identity token
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the full token
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "{prefix}…")
    }
}

/// A signed-in session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: SessionToken,

    pub user_id: UserId,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(user_id: UserId) -> Self {
        Self::with_ttl(user_id, Duration::hours(DEFAULT_SESSION_TTL_HOURS))
    }

    pub fn with_ttl(user_id: UserId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: SessionToken::generate(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Session store trait for token lookup
pub trait SessionStore: Send + Sync {
    /// Save a session
    fn save(&self, session: &AuthSession) -> Result<()>;

    /// Resolve a token to its user, failing with `Unauthenticated`
    fn resolve(&self, token: &SessionToken) -> Result<UserId>;

    /// Revoke a token (logout)
    fn revoke(&self, token: &SessionToken) -> Result<()>;
}

/// In-memory session store (for development/testing)
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, AuthSession>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Issue and save a fresh session for a user
    pub fn issue(&self, user_id: UserId) -> Result<AuthSession> {
        let session = AuthSession::new(user_id);
        self.save(&session)?;
        Ok(session)
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &AuthSession) -> Result<()> {
        let mut sessions = self.sessions.write()?;
        sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    fn resolve(&self, token: &SessionToken) -> Result<UserId> {
        let sessions = self.sessions.read()?;
        match sessions.get(token) {
            Some(session) if !session.is_expired() => Ok(session.user_id.clone()),
            Some(_) => Err(CoreError::Unauthenticated("session expired".into())),
            None => Err(CoreError::Unauthenticated("unknown session".into())),
        }
    }

    fn revoke(&self, token: &SessionToken) -> Result<()> {
        let mut sessions = self.sessions.write()?;
        sessions.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_resolve() {
        let store = MemorySessionStore::new();
        let session = store.issue(UserId::from_string("u1")).unwrap();

        let user_id = store.resolve(&session.token).unwrap();
        assert_eq!(user_id.as_str(), "u1");
    }

    #[test]
    fn test_revoked_token_is_rejected() {
        let store = MemorySessionStore::new();
        let session = store.issue(UserId::from_string("u1")).unwrap();
        store.revoke(&session.token).unwrap();

        let result = store.resolve(&session.token);
        assert!(matches!(result, Err(CoreError::Unauthenticated(_))));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let store = MemorySessionStore::new();
        let session = AuthSession::with_ttl(UserId::from_string("u1"), Duration::seconds(-1));
        store.save(&session).unwrap();

        assert!(store.resolve(&session.token).is_err());
    }

    #[test]
    fn test_token_display_is_truncated() {
        let token = SessionToken::from_string("abcdefghijklmnop");
        assert_eq!(token.to_string(), "abcdef…");
    }
}
