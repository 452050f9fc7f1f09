//! Store wrappers for observing and breaking the credential store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use warden_store::{
    CredentialStore, MemoryStore, NewUser, PasswordHash, StoreError, StoreResult, TokenRecord,
    UserRecord,
};
use warden_types::{Claim, SecurityStamp, UserId};

/// Delegates to a [`MemoryStore`] and counts every read
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads since creation or the last reset
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    fn read(&self) -> &MemoryStore {
        self.reads.fetch_add(1, Ordering::SeqCst);
        &self.inner
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn get_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        self.read().get_user_by_id(id).await
    }

    async fn get_user_by_identifier(&self, identifier: &str) -> StoreResult<Option<UserRecord>> {
        self.read().get_user_by_identifier(identifier).await
    }

    async fn get_password_hash(&self, id: UserId) -> StoreResult<Option<PasswordHash>> {
        self.read().get_password_hash(id).await
    }

    async fn get_security_stamp(&self, id: UserId) -> StoreResult<Option<SecurityStamp>> {
        self.read().get_security_stamp(id).await
    }

    async fn update_security_stamp(&self, id: UserId, stamp: SecurityStamp) -> StoreResult<()> {
        self.inner.update_security_stamp(id, stamp).await
    }

    async fn get_claims(&self, id: UserId) -> StoreResult<Vec<Claim>> {
        self.read().get_claims(id).await
    }

    async fn is_two_factor_enabled(&self, id: UserId) -> StoreResult<bool> {
        self.read().is_two_factor_enabled(id).await
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        self.inner.create_user(user).await
    }

    async fn update_password_hash(
        &self,
        id: UserId,
        hash: PasswordHash,
        stamp: SecurityStamp,
    ) -> StoreResult<()> {
        self.inner.update_password_hash(id, hash, stamp).await
    }

    async fn set_two_factor_enabled(
        &self,
        id: UserId,
        enabled: bool,
        stamp: SecurityStamp,
    ) -> StoreResult<()> {
        self.inner.set_two_factor_enabled(id, enabled, stamp).await
    }

    async fn set_authenticator_key(
        &self,
        id: UserId,
        key: Option<String>,
        stamp: SecurityStamp,
    ) -> StoreResult<()> {
        self.inner.set_authenticator_key(id, key, stamp).await
    }

    async fn replace_claims(&self, id: UserId, claims: Vec<Claim>) -> StoreResult<()> {
        self.inner.replace_claims(id, claims).await
    }

    async fn increment_access_failed(&self, id: UserId) -> StoreResult<u32> {
        self.inner.increment_access_failed(id).await
    }

    async fn reset_access_failed(&self, id: UserId) -> StoreResult<()> {
        self.inner.reset_access_failed(id).await
    }

    async fn set_lockout_end(&self, id: UserId, end: Option<DateTime<Utc>>) -> StoreResult<()> {
        self.inner.set_lockout_end(id, end).await
    }

    async fn insert_token(&self, token: TokenRecord) -> StoreResult<()> {
        self.inner.insert_token(token).await
    }

    async fn find_token(
        &self,
        user_id: UserId,
        provider: &str,
        token_hash: &str,
    ) -> StoreResult<Option<TokenRecord>> {
        self.read().find_token(user_id, provider, token_hash).await
    }

    async fn mark_token_used(&self, token: TokenRecord, at: DateTime<Utc>) -> StoreResult<bool> {
        self.inner.mark_token_used(token, at).await
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired_tokens(now).await
    }
}

/// Store whose backend is down
#[derive(Default)]
pub struct FailingStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl CredentialStore for FailingStore {
    async fn get_user_by_id(&self, _: UserId) -> StoreResult<Option<UserRecord>> {
        down()
    }

    async fn get_user_by_identifier(&self, _: &str) -> StoreResult<Option<UserRecord>> {
        down()
    }

    async fn get_password_hash(&self, _: UserId) -> StoreResult<Option<PasswordHash>> {
        down()
    }

    async fn get_security_stamp(&self, _: UserId) -> StoreResult<Option<SecurityStamp>> {
        down()
    }

    async fn update_security_stamp(&self, _: UserId, _: SecurityStamp) -> StoreResult<()> {
        down()
    }

    async fn get_claims(&self, _: UserId) -> StoreResult<Vec<Claim>> {
        down()
    }

    async fn is_two_factor_enabled(&self, _: UserId) -> StoreResult<bool> {
        down()
    }

    async fn create_user(&self, _: NewUser) -> StoreResult<UserRecord> {
        down()
    }

    async fn update_password_hash(
        &self,
        _: UserId,
        _: PasswordHash,
        _: SecurityStamp,
    ) -> StoreResult<()> {
        down()
    }

    async fn set_two_factor_enabled(&self, _: UserId, _: bool, _: SecurityStamp) -> StoreResult<()> {
        down()
    }

    async fn set_authenticator_key(
        &self,
        _: UserId,
        _: Option<String>,
        _: SecurityStamp,
    ) -> StoreResult<()> {
        down()
    }

    async fn replace_claims(&self, _: UserId, _: Vec<Claim>) -> StoreResult<()> {
        down()
    }

    async fn increment_access_failed(&self, _: UserId) -> StoreResult<u32> {
        down()
    }

    async fn reset_access_failed(&self, _: UserId) -> StoreResult<()> {
        down()
    }

    async fn set_lockout_end(&self, _: UserId, _: Option<DateTime<Utc>>) -> StoreResult<()> {
        down()
    }

    async fn insert_token(&self, _: TokenRecord) -> StoreResult<()> {
        down()
    }

    async fn find_token(&self, _: UserId, _: &str, _: &str) -> StoreResult<Option<TokenRecord>> {
        down()
    }

    async fn mark_token_used(&self, _: TokenRecord, _: DateTime<Utc>) -> StoreResult<bool> {
        down()
    }

    async fn purge_expired_tokens(&self, _: DateTime<Utc>) -> StoreResult<u64> {
        down()
    }
}
