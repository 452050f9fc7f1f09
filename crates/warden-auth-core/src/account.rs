//! Account management
//!
//! Every credential-affecting mutation writes a fresh security stamp in the
//! same store call as the change itself, then announces the change once.

use std::sync::Arc;
use tracing::{info, instrument};
use warden_store::{CredentialStore, NewUser, UserRecord};
use warden_types::{Claim, SecurityStamp, UserId};

use crate::locks::UserLocks;
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::principal::ClaimsPrincipalBuilder;
use crate::state::AuthStateChange;
use crate::totp;
use crate::AuthError;

/// Registration input
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub user_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: String,
    pub roles: Vec<String>,
    pub claims: Vec<Claim>,
}

impl NewAccount {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_roles<I, V>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_claims(mut self, claims: Vec<Claim>) -> Self {
        self.claims = claims;
        self
    }
}

/// A freshly reset authenticator key and its `otpauth://` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorEnrollment {
    pub key: String,
    pub uri: String,
}

/// Registration and credential changes
pub struct AccountManager<S: CredentialStore> {
    store: Arc<S>,
    hasher: Arc<dyn PasswordHasher>,
    policy: PasswordPolicy,
    locks: UserLocks,
    principals: ClaimsPrincipalBuilder,
    totp_issuer: String,
}

impl<S: CredentialStore> AccountManager<S> {
    pub fn new(
        store: Arc<S>,
        hasher: Arc<dyn PasswordHasher>,
        policy: PasswordPolicy,
        locks: UserLocks,
        principals: ClaimsPrincipalBuilder,
        totp_issuer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            hasher,
            policy,
            locks,
            principals,
            totp_issuer: totp_issuer.into(),
        }
    }

    /// Create a user with a policy-checked password and a fresh stamp
    #[instrument(skip(self, account), fields(user_name = %account.user_name))]
    pub async fn register(&self, account: NewAccount) -> Result<UserRecord, AuthError> {
        if account.user_name.trim().is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        self.policy.validate(&account.password)?;
        let password_hash = self.hasher.hash(&account.password)?;

        let user = self
            .store
            .create_user(NewUser {
                id: UserId::new(),
                user_name: account.user_name,
                email: account.email,
                phone_number: account.phone_number,
                password_hash,
                security_stamp: SecurityStamp::generate(),
                roles: account.roles,
                claims: account.claims,
                lockout_enabled: true,
            })
            .await?;
        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Change the password after checking the current one
    #[instrument(skip(self, current, new_password))]
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let _guard = self.locks.lock(user_id).await;

        let hash = self
            .store
            .get_password_hash(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        if !self.hasher.verify(&hash, current)? {
            return Err(AuthError::InvalidCredentials);
        }
        self.write_password(user_id, new_password).await
    }

    /// Set a new password without the current one (administrative reset)
    #[instrument(skip(self, new_password))]
    pub async fn reset_password(&self, user_id: UserId, new_password: &str) -> Result<(), AuthError> {
        let _guard = self.locks.lock(user_id).await;
        self.write_password(user_id, new_password).await
    }

    async fn write_password(&self, user_id: UserId, new_password: &str) -> Result<(), AuthError> {
        self.policy.validate(new_password)?;
        let hash = self.hasher.hash(new_password)?;
        self.store
            .update_password_hash(user_id, hash, SecurityStamp::generate())
            .await?;
        info!(user_id = %user_id, "Password changed");
        self.principals
            .observe(&AuthStateChange::SecurityStampChanged { user_id });
        Ok(())
    }

    /// Toggle two-factor sign-in
    #[instrument(skip(self))]
    pub async fn set_two_factor_enabled(
        &self,
        user_id: UserId,
        enabled: bool,
    ) -> Result<(), AuthError> {
        let _guard = self.locks.lock(user_id).await;
        self.store
            .set_two_factor_enabled(user_id, enabled, SecurityStamp::generate())
            .await?;
        info!(user_id = %user_id, enabled, "Two-factor setting changed");
        self.principals
            .observe(&AuthStateChange::TwoFactorChanged { user_id, enabled });
        Ok(())
    }

    /// Replace the authenticator key. Codes from the old key stop working.
    #[instrument(skip(self))]
    pub async fn reset_authenticator_key(
        &self,
        user_id: UserId,
    ) -> Result<AuthenticatorEnrollment, AuthError> {
        let _guard = self.locks.lock(user_id).await;
        let user = self
            .store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let key = totp::generate_key();
        let uri = totp::enrollment_uri(&key, &self.totp_issuer, &user.user_name)?;
        self.store
            .set_authenticator_key(user_id, Some(key.clone()), SecurityStamp::generate())
            .await?;
        self.principals
            .observe(&AuthStateChange::SecurityStampChanged { user_id });
        Ok(AuthenticatorEnrollment { key, uri })
    }

    /// Replace the user's stored claims
    ///
    /// The stamp is left alone; live sessions pick the new claims up at their
    /// next validation.
    #[instrument(skip(self, claims))]
    pub async fn update_claims(&self, user_id: UserId, claims: Vec<Claim>) -> Result<(), AuthError> {
        let _guard = self.locks.lock(user_id).await;
        self.store.replace_claims(user_id, claims).await?;
        self.principals
            .observe(&AuthStateChange::ClaimsUpdated { user_id });
        Ok(())
    }

    /// Regenerate the stamp, invalidating every session at its next check
    #[instrument(skip(self))]
    pub async fn update_security_stamp(&self, user_id: UserId) -> Result<SecurityStamp, AuthError> {
        let _guard = self.locks.lock(user_id).await;
        let stamp = SecurityStamp::generate();
        self.store
            .update_security_stamp(user_id, stamp.clone())
            .await?;
        self.principals
            .observe(&AuthStateChange::SecurityStampChanged { user_id });
        Ok(stamp)
    }
}

impl<S: CredentialStore> std::fmt::Debug for AccountManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager")
            .field("policy", &self.policy)
            .field("totp_issuer", &self.totp_issuer)
            .finish_non_exhaustive()
    }
}
