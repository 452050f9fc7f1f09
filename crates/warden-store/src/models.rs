//! Credential store record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_types::{Claim, SecurityStamp, UserId};

/// Stored password hash: opaque value plus the algorithm that produced it
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    /// Algorithm tag, e.g. `argon2id`
    pub algorithm: String,
    /// Encoded hash (PHC string for Argon2)
    pub value: String,
}

impl PasswordHash {
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// User record as held by the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub user_name: String,
    pub normalized_user_name: String,
    pub email: Option<String>,
    pub normalized_email: Option<String>,
    pub email_confirmed: bool,
    pub phone_number: Option<String>,
    pub password_hash: PasswordHash,
    pub security_stamp: SecurityStamp,
    /// When `security_stamp` last changed
    pub security_stamp_changed_at: DateTime<Utc>,
    pub two_factor_enabled: bool,
    /// Base32 secret for authenticator apps, if enrolled
    pub authenticator_key: Option<String>,
    /// When `authenticator_key` was last written
    pub authenticator_key_set_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    pub claims: Vec<Claim>,
    pub lockout_enabled: bool,
    pub lockout_end: Option<DateTime<Utc>>,
    pub access_failed_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Whether the account is locked out at the given instant
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_enabled && self.lockout_end.is_some_and(|end| end > now)
    }
}

/// Create user input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub user_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: PasswordHash,
    pub security_stamp: SecurityStamp,
    pub roles: Vec<String>,
    pub claims: Vec<Claim>,
    pub lockout_enabled: bool,
}

/// Two-factor token ledger entry
///
/// Bound to (user, provider). `token_hash` is the SHA-256 of the code so raw
/// codes never sit in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: UserId,
    pub provider: String,
    pub token_hash: String,
    /// Stamp that was current when the token was issued
    pub security_stamp: SecurityStamp,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
