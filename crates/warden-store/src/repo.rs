//! Credential store trait
//!
//! Async interface consumed by the authentication core. Implementations must
//! make each write to a single user's record atomic. Every write that replaces
//! the security stamp also sets `security_stamp_changed_at`;
//! `set_authenticator_key` sets `authenticator_key_set_at` to the same instant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_types::{Claim, SecurityStamp, UserId};

use crate::error::StoreResult;
use crate::models::*;

/// Credential store trait
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a user by ID
    async fn get_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>>;

    /// Find a user by user name or email (case-insensitive)
    async fn get_user_by_identifier(&self, identifier: &str) -> StoreResult<Option<UserRecord>>;

    /// Read the password hash
    async fn get_password_hash(&self, id: UserId) -> StoreResult<Option<PasswordHash>>;

    /// Read the current security stamp
    async fn get_security_stamp(&self, id: UserId) -> StoreResult<Option<SecurityStamp>>;

    /// Replace the security stamp
    async fn update_security_stamp(&self, id: UserId, stamp: SecurityStamp) -> StoreResult<()>;

    /// Read the user's claims
    async fn get_claims(&self, id: UserId) -> StoreResult<Vec<Claim>>;

    /// Read the two-factor flag
    async fn is_two_factor_enabled(&self, id: UserId) -> StoreResult<bool>;

    /// Create a new user
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord>;

    /// Replace the password hash and security stamp in one write
    async fn update_password_hash(
        &self,
        id: UserId,
        hash: PasswordHash,
        stamp: SecurityStamp,
    ) -> StoreResult<()>;

    /// Toggle two-factor and replace the security stamp in one write
    async fn set_two_factor_enabled(
        &self,
        id: UserId,
        enabled: bool,
        stamp: SecurityStamp,
    ) -> StoreResult<()>;

    /// Replace the authenticator key and security stamp in one write
    async fn set_authenticator_key(
        &self,
        id: UserId,
        key: Option<String>,
        stamp: SecurityStamp,
    ) -> StoreResult<()>;

    /// Replace the user's claims
    async fn replace_claims(&self, id: UserId, claims: Vec<Claim>) -> StoreResult<()>;

    /// Increment the failed access counter, returning the new count
    async fn increment_access_failed(&self, id: UserId) -> StoreResult<u32>;

    /// Reset the failed access counter
    async fn reset_access_failed(&self, id: UserId) -> StoreResult<()>;

    /// Set or clear the lockout end
    async fn set_lockout_end(&self, id: UserId, end: Option<DateTime<Utc>>) -> StoreResult<()>;

    /// Record an issued two-factor token
    async fn insert_token(&self, token: TokenRecord) -> StoreResult<()>;

    /// Find a token by owner, provider and hash
    async fn find_token(
        &self,
        user_id: UserId,
        provider: &str,
        token_hash: &str,
    ) -> StoreResult<Option<TokenRecord>>;

    /// Atomically mark a token used
    ///
    /// Inserts the record already marked used when no entry exists. Returns
    /// `false` when the token had already been used.
    async fn mark_token_used(&self, token: TokenRecord, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Delete expired tokens
    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
