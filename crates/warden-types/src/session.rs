//! Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Claim, SecurityStamp, UserId};

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Signed-in session
///
/// Holds the security stamp that was current at sign-in. The session stays
/// valid only while that copy matches the user's stored stamp; the match is
/// re-checked at most once per validation interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID
    pub id: SessionId,
    /// User who owns the session (reference, not ownership)
    pub user_id: UserId,
    /// Stamp copied from the user record at sign-in
    pub security_stamp: SecurityStamp,
    /// Authentication type marker for the principal built from this session
    pub authentication_type: String,
    /// Claim snapshot, refreshed on every store-backed validation
    pub claims: Vec<Claim>,
    /// Sign-in time
    pub issued_at: DateTime<Utc>,
    /// Last time the stamp was checked against the store
    pub last_validated: DateTime<Utc>,
    /// Set once a validation has found the stamp stale; never cleared
    #[serde(default)]
    pub invalidated: bool,
}

impl Session {
    /// Create a session for a user at the given instant
    pub fn new(
        user_id: UserId,
        security_stamp: SecurityStamp,
        authentication_type: impl Into<String>,
        claims: Vec<Claim>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            security_stamp,
            authentication_type: authentication_type.into(),
            claims,
            issued_at: now,
            last_validated: now,
            invalidated: false,
        }
    }

    /// Time elapsed since the last store-backed validation
    pub fn since_validated(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_validated
    }
}
