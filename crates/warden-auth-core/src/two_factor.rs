//! Two-factor token providers
//!
//! Providers are registered by name in a [`TwoFactorRegistry`]. Every
//! provider enforces single use through the store's token ledger.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use warden_store::{CredentialStore, TokenRecord, UserRecord};

use crate::config::chrono_duration;
use crate::crypto::{hash_token, numeric_code, random_bytes, HmacKey};
use crate::metrics;
use crate::AuthError;

/// Default provider names
pub mod provider_names {
    pub const EMAIL: &str = "Email";
    pub const PHONE: &str = "Phone";
    pub const AUTHENTICATOR: &str = "Authenticator";
}

/// Generator and validator of one-time codes for one delivery channel
#[async_trait]
pub trait TwoFactorTokenProvider: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    /// Whether this provider can serve the user (e.g. has an email on file)
    fn can_generate(&self, user: &UserRecord) -> bool;

    /// Issue a code for the user
    async fn generate(&self, user: &UserRecord) -> Result<String, AuthError>;

    /// Check and consume a code.
    ///
    /// Rejections are `InvalidToken`, `TokenExpired`, `TokenAlreadyUsed` or
    /// `StampMismatch`; store failures surface as `AuthError::Store`.
    async fn verify(&self, user: &UserRecord, token: &str) -> Result<(), AuthError>;
}

/// Providers keyed by name
#[derive(Clone, Default)]
pub struct TwoFactorRegistry {
    providers: HashMap<String, Arc<dyn TwoFactorTokenProvider>>,
}

impl TwoFactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its name, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn TwoFactorTokenProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TwoFactorTokenProvider>> {
        self.providers.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Names of providers that can serve `user`, sorted
    pub fn providers_for(&self, user: &UserRecord) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .values()
            .filter(|p| p.can_generate(user))
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        names
    }

    fn usable(
        &self,
        user: &UserRecord,
        name: &str,
    ) -> Result<&Arc<dyn TwoFactorTokenProvider>, AuthError> {
        self.providers
            .get(name)
            .filter(|p| p.can_generate(user))
            .ok_or_else(|| AuthError::ProviderNotRegistered(name.to_string()))
    }

    /// Issue a code from the named provider
    pub async fn generate(&self, user: &UserRecord, provider: &str) -> Result<String, AuthError> {
        self.usable(user, provider)?.generate(user).await
    }

    /// Check a code, reporting the exact rejection
    #[instrument(skip(self, user, token), fields(user_id = %user.id))]
    pub async fn verify(
        &self,
        user: &UserRecord,
        provider: &str,
        token: &str,
    ) -> Result<(), AuthError> {
        let result = match self.usable(user, provider) {
            Ok(p) => p.verify(user, token).await,
            Err(e) => Err(e),
        };
        let outcome = match &result {
            Ok(()) => "accepted",
            Err(e) if e.is_recoverable() => e.metric_label(),
            Err(_) => "error",
        };
        metrics::record_two_factor_validation(provider, outcome);
        if let Err(e) = &result {
            debug!(provider, reason = %e, "Two-factor token rejected");
        }
        result
    }

    /// Check a code. `Ok(false)` for every recoverable rejection, including
    /// an unknown provider; `Err` only for infrastructure failures.
    pub async fn validate(
        &self,
        user: &UserRecord,
        provider: &str,
        token: &str,
    ) -> Result<bool, AuthError> {
        match self.verify(user, provider, token).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_recoverable() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for TwoFactorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("TwoFactorRegistry")
            .field("providers", &names)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Email,
    Phone,
}

/// Six-digit codes bound to the user's security stamp, delivered out of band
/// (email or SMS) by the host
pub struct StampedCodeProvider {
    name: String,
    channel: Channel,
    store: Arc<dyn CredentialStore>,
    key: HmacKey,
    lifespan: Duration,
}

impl StampedCodeProvider {
    pub const DIGITS: u32 = 6;

    /// Codes for users with an email address
    pub fn email(store: Arc<dyn CredentialStore>, key: HmacKey, lifespan: Duration) -> Self {
        Self::new(provider_names::EMAIL, Channel::Email, store, key, lifespan)
    }

    /// Codes for users with a phone number
    pub fn phone(store: Arc<dyn CredentialStore>, key: HmacKey, lifespan: Duration) -> Self {
        Self::new(provider_names::PHONE, Channel::Phone, store, key, lifespan)
    }

    fn new(
        name: &str,
        channel: Channel,
        store: Arc<dyn CredentialStore>,
        key: HmacKey,
        lifespan: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            channel,
            store,
            key,
            lifespan,
        }
    }

    /// Register under a different name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl std::fmt::Debug for StampedCodeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampedCodeProvider")
            .field("name", &self.name)
            .field("lifespan", &self.lifespan)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TwoFactorTokenProvider for StampedCodeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_generate(&self, user: &UserRecord) -> bool {
        match self.channel {
            Channel::Email => user.email.as_deref().is_some_and(|e| !e.is_empty()),
            Channel::Phone => user.phone_number.as_deref().is_some_and(|p| !p.is_empty()),
        }
    }

    async fn generate(&self, user: &UserRecord) -> Result<String, AuthError> {
        let stamp = self
            .store
            .get_security_stamp(user.id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let nonce = random_bytes::<16>();
        let mac = self.key.sign_parts(&[
            user.id.0.as_bytes().as_slice(),
            self.name.as_bytes(),
            stamp.as_str().as_bytes(),
            nonce.as_slice(),
        ]);
        let code = numeric_code(&mac, Self::DIGITS);

        let now = Utc::now();
        self.store
            .insert_token(TokenRecord {
                user_id: user.id,
                provider: self.name.clone(),
                token_hash: hash_token(&code),
                security_stamp: stamp,
                issued_at: now,
                expires_at: now + chrono_duration(self.lifespan),
                used_at: None,
            })
            .await?;

        debug!(user_id = %user.id, provider = %self.name, "Issued two-factor code");
        Ok(code)
    }

    async fn verify(&self, user: &UserRecord, token: &str) -> Result<(), AuthError> {
        let token = token.trim();
        if token.len() != Self::DIGITS as usize || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthError::InvalidToken);
        }

        let record = self
            .store
            .find_token(user.id, &self.name, &hash_token(token))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let now = Utc::now();
        if record.is_used() {
            return Err(AuthError::TokenAlreadyUsed);
        }
        if record.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        let current = self.store.get_security_stamp(user.id).await?;
        if current.as_ref() != Some(&record.security_stamp) {
            return Err(AuthError::StampMismatch);
        }

        if !self.store.mark_token_used(record, now).await? {
            return Err(AuthError::TokenAlreadyUsed);
        }
        Ok(())
    }
}
