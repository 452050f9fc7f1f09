//! In-memory credential store
//!
//! DashMap-backed reference implementation. Every write to a user goes through
//! `get_mut`, which holds the entry's shard lock for the whole update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use warden_types::{normalize_identifier, Claim, SecurityStamp, UserId};

use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::repo::CredentialStore;

type TokenKey = (UserId, String, String);

/// In-memory credential store
#[derive(Default, Clone)]
pub struct MemoryStore {
    users: Arc<DashMap<UserId, UserRecord>>,
    by_identifier: Arc<DashMap<String, UserId>>,
    tokens: Arc<DashMap<TokenKey, TokenRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of ledger entries (issued or used tokens)
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn with_user<T>(
        &self,
        id: UserId,
        f: impl FnOnce(&mut UserRecord) -> T,
    ) -> StoreResult<T> {
        let mut user = self.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        let out = f(&mut user);
        user.updated_at = Utc::now();
        Ok(out)
    }

    fn token_key(user_id: UserId, provider: &str, token_hash: &str) -> TokenKey {
        (user_id, provider.to_string(), token_hash.to_string())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.get(&id).map(|r| r.value().clone()))
    }

    async fn get_user_by_identifier(&self, identifier: &str) -> StoreResult<Option<UserRecord>> {
        let key = normalize_identifier(identifier);
        Ok(self
            .by_identifier
            .get(&key)
            .and_then(|id| self.users.get(id.value()).map(|r| r.value().clone())))
    }

    async fn get_password_hash(&self, id: UserId) -> StoreResult<Option<PasswordHash>> {
        Ok(self.users.get(&id).map(|r| r.password_hash.clone()))
    }

    async fn get_security_stamp(&self, id: UserId) -> StoreResult<Option<SecurityStamp>> {
        Ok(self.users.get(&id).map(|r| r.security_stamp.clone()))
    }

    async fn update_security_stamp(&self, id: UserId, stamp: SecurityStamp) -> StoreResult<()> {
        self.with_user(id, |u| rotate_stamp(u, stamp))
    }

    async fn get_claims(&self, id: UserId) -> StoreResult<Vec<Claim>> {
        Ok(self
            .users
            .get(&id)
            .map(|r| r.claims.clone())
            .unwrap_or_default())
    }

    async fn is_two_factor_enabled(&self, id: UserId) -> StoreResult<bool> {
        Ok(self.users.get(&id).is_some_and(|r| r.two_factor_enabled))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let normalized_user_name = normalize_identifier(&user.user_name);
        let normalized_email = user.email.as_deref().map(normalize_identifier);

        // Claim the identifiers first so two concurrent registrations for the
        // same name cannot both succeed.
        match self.by_identifier.entry(normalized_user_name.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "user name '{}' is taken",
                    user.user_name
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }
        if let Some(ref email) = normalized_email {
            if email != &normalized_user_name {
                let taken = match self.by_identifier.entry(email.clone()) {
                    Entry::Occupied(_) => true,
                    Entry::Vacant(slot) => {
                        slot.insert(user.id);
                        false
                    }
                };
                // The entry guard is released above; removing while holding it
                // could deadlock on a shared shard.
                if taken {
                    self.by_identifier.remove(&normalized_user_name);
                    return Err(StoreError::Conflict("email is taken".to_string()));
                }
            }
        }

        let now = Utc::now();
        let record = UserRecord {
            id: user.id,
            user_name: user.user_name,
            normalized_user_name,
            email: user.email,
            normalized_email,
            email_confirmed: false,
            phone_number: user.phone_number,
            password_hash: user.password_hash,
            security_stamp: user.security_stamp,
            security_stamp_changed_at: now,
            two_factor_enabled: false,
            authenticator_key: None,
            authenticator_key_set_at: None,
            roles: user.roles,
            claims: user.claims,
            lockout_enabled: user.lockout_enabled,
            lockout_end: None,
            access_failed_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_password_hash(
        &self,
        id: UserId,
        hash: PasswordHash,
        stamp: SecurityStamp,
    ) -> StoreResult<()> {
        self.with_user(id, |u| {
            u.password_hash = hash;
            rotate_stamp(u, stamp);
        })
    }

    async fn set_two_factor_enabled(
        &self,
        id: UserId,
        enabled: bool,
        stamp: SecurityStamp,
    ) -> StoreResult<()> {
        self.with_user(id, |u| {
            u.two_factor_enabled = enabled;
            rotate_stamp(u, stamp);
        })
    }

    async fn set_authenticator_key(
        &self,
        id: UserId,
        key: Option<String>,
        stamp: SecurityStamp,
    ) -> StoreResult<()> {
        self.with_user(id, |u| {
            u.authenticator_key = key;
            rotate_stamp(u, stamp);
            u.authenticator_key_set_at = Some(u.security_stamp_changed_at);
        })
    }

    async fn replace_claims(&self, id: UserId, claims: Vec<Claim>) -> StoreResult<()> {
        self.with_user(id, |u| u.claims = claims)
    }

    async fn increment_access_failed(&self, id: UserId) -> StoreResult<u32> {
        self.with_user(id, |u| {
            u.access_failed_count = u.access_failed_count.saturating_add(1);
            u.access_failed_count
        })
    }

    async fn reset_access_failed(&self, id: UserId) -> StoreResult<()> {
        self.with_user(id, |u| u.access_failed_count = 0)
    }

    async fn set_lockout_end(&self, id: UserId, end: Option<DateTime<Utc>>) -> StoreResult<()> {
        self.with_user(id, |u| u.lockout_end = end)
    }

    async fn insert_token(&self, token: TokenRecord) -> StoreResult<()> {
        let key = Self::token_key(token.user_id, &token.provider, &token.token_hash);
        self.tokens.insert(key, token);
        Ok(())
    }

    async fn find_token(
        &self,
        user_id: UserId,
        provider: &str,
        token_hash: &str,
    ) -> StoreResult<Option<TokenRecord>> {
        let key = Self::token_key(user_id, provider, token_hash);
        Ok(self.tokens.get(&key).map(|r| r.value().clone()))
    }

    async fn mark_token_used(&self, token: TokenRecord, at: DateTime<Utc>) -> StoreResult<bool> {
        let key = Self::token_key(token.user_id, &token.provider, &token.token_hash);
        match self.tokens.entry(key) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_used() {
                    return Ok(false);
                }
                existing.get_mut().used_at = Some(at);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(TokenRecord {
                    used_at: Some(at),
                    ..token
                });
                Ok(true)
            }
        }
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let before = self.tokens.len();
        self.tokens.retain(|_, t| !t.is_expired(now));
        Ok((before - self.tokens.len()) as u64)
    }
}

fn rotate_stamp(user: &mut UserRecord, stamp: SecurityStamp) {
    user.security_stamp = stamp;
    user.security_stamp_changed_at = Utc::now();
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("users", &self.users.len())
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(name: &str, email: Option<&str>) -> NewUser {
        NewUser {
            id: UserId::new(),
            user_name: name.to_string(),
            email: email.map(str::to_string),
            phone_number: None,
            password_hash: PasswordHash::new("test", "hash"),
            security_stamp: SecurityStamp::generate(),
            roles: vec![],
            claims: vec![],
            lockout_enabled: true,
        }
    }

    fn token(user_id: UserId, hash: &str, expires_at: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            user_id,
            provider: "Email".to_string(),
            token_hash: hash.to_string(),
            security_stamp: SecurityStamp::from_string("S1"),
            issued_at: Utc::now(),
            expires_at,
            used_at: None,
        }
    }

    #[tokio::test]
    async fn test_user_lookup_by_name_and_email() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user("alice", Some("alice@example.com")))
            .await
            .unwrap();

        let by_name = store.get_user_by_identifier("ALICE").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(user.id));

        let by_email = store
            .get_user_by_identifier("Alice@Example.com")
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));

        assert!(store.get_user_by_identifier("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_name_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice", None)).await.unwrap();
        let err = store.create_user(new_user("Alice", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_releases_user_name() {
        let store = MemoryStore::new();
        store
            .create_user(new_user("alice", Some("shared@example.com")))
            .await
            .unwrap();
        let err = store
            .create_user(new_user("bob", Some("shared@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // "bob" must be free again after the failed registration
        store.create_user(new_user("bob", None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_password_update_replaces_stamp() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", None)).await.unwrap();
        let stamp = SecurityStamp::generate();
        store
            .update_password_hash(user.id, PasswordHash::new("test", "new"), stamp.clone())
            .await
            .unwrap();
        assert_eq!(
            store.get_security_stamp(user.id).await.unwrap(),
            Some(stamp)
        );
        assert_eq!(
            store.get_password_hash(user.id).await.unwrap().unwrap().value,
            "new"
        );
    }

    #[tokio::test]
    async fn test_stamp_writes_record_rotation_time() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", None)).await.unwrap();
        assert!(user.authenticator_key_set_at.is_none());

        store
            .set_authenticator_key(user.id, Some("KEY".into()), SecurityStamp::generate())
            .await
            .unwrap();
        let enrolled = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(enrolled.security_stamp_changed_at >= user.security_stamp_changed_at);
        assert_eq!(
            enrolled.authenticator_key_set_at,
            Some(enrolled.security_stamp_changed_at)
        );

        store
            .update_security_stamp(user.id, SecurityStamp::generate())
            .await
            .unwrap();
        let rotated = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(rotated.security_stamp_changed_at >= enrolled.security_stamp_changed_at);
        assert_eq!(rotated.authenticator_key_set_at, enrolled.authenticator_key_set_at);
    }

    #[tokio::test]
    async fn test_writes_to_missing_user_fail() {
        let store = MemoryStore::new();
        let err = store
            .update_security_stamp(UserId::new(), SecurityStamp::generate())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn test_access_failed_counter() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", None)).await.unwrap();
        assert_eq!(store.increment_access_failed(user.id).await.unwrap(), 1);
        assert_eq!(store.increment_access_failed(user.id).await.unwrap(), 2);
        store.reset_access_failed(user.id).await.unwrap();
        assert_eq!(store.increment_access_failed(user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_token_used_is_single_shot() {
        let store = MemoryStore::new();
        let user_id = UserId::new();
        let record = token(user_id, "h1", Utc::now() + Duration::minutes(3));
        store.insert_token(record.clone()).await.unwrap();

        assert!(store.mark_token_used(record.clone(), Utc::now()).await.unwrap());
        assert!(!store.mark_token_used(record.clone(), Utc::now()).await.unwrap());

        let stored = store.find_token(user_id, "Email", "h1").await.unwrap().unwrap();
        assert!(stored.is_used());
    }

    #[tokio::test]
    async fn test_mark_token_used_inserts_missing_record() {
        let store = MemoryStore::new();
        let record = token(UserId::new(), "h2", Utc::now() + Duration::minutes(3));
        assert!(store.mark_token_used(record.clone(), Utc::now()).await.unwrap());
        assert!(!store.mark_token_used(record, Utc::now()).await.unwrap());
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() {
        let store = MemoryStore::new();
        let user_id = UserId::new();
        let now = Utc::now();
        store
            .insert_token(token(user_id, "old", now - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .insert_token(token(user_id, "fresh", now + Duration::minutes(1)))
            .await
            .unwrap();
        assert_eq!(store.purge_expired_tokens(now).await.unwrap(), 1);
        assert!(store.find_token(user_id, "Email", "fresh").await.unwrap().is_some());
    }
}
