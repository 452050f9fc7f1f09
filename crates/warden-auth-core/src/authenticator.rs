//! Credential sign-in
//!
//! Checks a password, applies lockout, decides whether a second factor is
//! needed, and hands back a [`SignInResult`]. Establishing the session is a
//! separate step so the caller controls when it happens.
//!
//! A sign-in that needs a second factor returns a pending ticket; only that
//! ticket (unexpired, and with the user's stamp unchanged) can be completed
//! with a code.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};
use warden_store::{CredentialStore, PasswordHash, UserRecord};
use warden_types::{Session, UserId};

use crate::config::{chrono_duration, AuthConfig, LockoutOptions};
use crate::crypto::random_bytes;
use crate::locks::UserLocks;
use crate::metrics;
use crate::password::PasswordHasher;
use crate::principal::{user_claims, ClaimsPrincipalBuilder};
use crate::state::AuthStateChange;
use crate::ticket::PendingTwoFactorProtector;
use crate::two_factor::TwoFactorRegistry;
use crate::AuthError;

/// Outcome of a sign-in attempt
#[derive(Debug, Clone)]
pub enum SignInResult {
    /// Credentials accepted; the caller may establish a session
    Success(UserRecord),
    /// Password accepted but a second factor must be presented first.
    /// `ticket` is handed back to [`SessionAuthenticator::two_factor_sign_in`].
    RequiresTwoFactor { user: UserRecord, ticket: String },
    /// Account is locked out
    LockedOut,
    /// Unknown user or wrong credentials (deliberately not distinguished)
    Failed,
}

impl SignInResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RequiresTwoFactor { .. } => "requires_two_factor",
            Self::LockedOut => "locked_out",
            Self::Failed => "failed",
        }
    }

    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Self::Success(user) | Self::RequiresTwoFactor { user, .. } => Some(user),
            Self::LockedOut | Self::Failed => None,
        }
    }
}

/// Orchestrates password checks, lockout and the two-factor decision
pub struct SessionAuthenticator<S: CredentialStore> {
    store: Arc<S>,
    hasher: Arc<dyn PasswordHasher>,
    registry: Arc<TwoFactorRegistry>,
    locks: UserLocks,
    principals: ClaimsPrincipalBuilder,
    pending: PendingTwoFactorProtector,
    lockout: LockoutOptions,
    /// Verified against when the identifier is unknown, so that path costs
    /// the same as a wrong password
    decoy_hash: PasswordHash,
}

impl<S: CredentialStore> SessionAuthenticator<S> {
    pub fn try_new(
        config: &AuthConfig,
        store: Arc<S>,
        hasher: Arc<dyn PasswordHasher>,
        registry: Arc<TwoFactorRegistry>,
        locks: UserLocks,
        principals: ClaimsPrincipalBuilder,
    ) -> Result<Self, AuthError> {
        let decoy_hash = hasher.hash(&hex::encode(random_bytes::<16>()))?;
        let pending = PendingTwoFactorProtector::new(
            config.ticket_secret.as_bytes(),
            config.pending_two_factor_lifetime,
        )?;
        Ok(Self {
            store,
            hasher,
            registry,
            locks,
            principals,
            pending,
            lockout: config.lockout.clone(),
            decoy_hash,
        })
    }

    /// Check `password` for the user named by `identifier` (user name or
    /// email).
    ///
    /// `Err` only for store failures; every authentication outcome is an
    /// `Ok(SignInResult)`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SignInResult, AuthError> {
        let started = Instant::now();
        let result = self.authenticate_inner(identifier, password).await;
        if let Ok(outcome) = &result {
            metrics::record_sign_in(outcome.kind(), started.elapsed().as_secs_f64());
        }
        result
    }

    async fn authenticate_inner(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SignInResult, AuthError> {
        let Some(found) = self.store.get_user_by_identifier(identifier).await? else {
            self.burn_decoy(password);
            debug!("Sign-in failed");
            return Ok(SignInResult::Failed);
        };

        let _guard = self.locks.lock(found.id).await;

        // Re-read under the lock so lockout counters are current
        let Some(user) = self.store.get_user_by_id(found.id).await? else {
            self.burn_decoy(password);
            return Ok(SignInResult::Failed);
        };

        let now = Utc::now();
        if user.is_locked_out(now) {
            debug!(user_id = %user.id, "Sign-in rejected, account locked out");
            return Ok(SignInResult::LockedOut);
        }

        let Some(hash) = self.store.get_password_hash(user.id).await? else {
            self.burn_decoy(password);
            return Ok(SignInResult::Failed);
        };

        match self.hasher.verify(&hash, password) {
            Ok(true) => {}
            Ok(false) => {
                debug!(user_id = %user.id, "Sign-in failed");
                return self.record_failure(&user).await;
            }
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Stored password hash unusable");
                return Ok(SignInResult::Failed);
            }
        }

        if self.store.is_two_factor_enabled(user.id).await? {
            if self.registry.providers_for(&user).is_empty() {
                warn!(
                    user_id = %user.id,
                    "Two-factor enabled but no provider can serve this user, signing in without it"
                );
                metrics::record_two_factor_fallback();
            } else {
                debug!(user_id = %user.id, "Second factor required");
                let ticket = self.pending.issue(user.id, &user.security_stamp)?;
                return Ok(SignInResult::RequiresTwoFactor { user, ticket });
            }
        }

        if user.access_failed_count > 0 {
            self.store.reset_access_failed(user.id).await?;
        }
        Ok(SignInResult::Success(user))
    }

    /// Complete a sign-in that returned `RequiresTwoFactor`
    ///
    /// `ticket` is the pending ticket from that result. It is refused once
    /// expired, or when the user's stamp has changed since it was issued.
    #[instrument(skip(self, ticket, token))]
    pub async fn two_factor_sign_in(
        &self,
        ticket: &str,
        provider: &str,
        token: &str,
    ) -> Result<SignInResult, AuthError> {
        let started = Instant::now();
        let result = self.two_factor_sign_in_inner(ticket, provider, token).await?;
        metrics::record_sign_in(result.kind(), started.elapsed().as_secs_f64());
        Ok(result)
    }

    async fn two_factor_sign_in_inner(
        &self,
        ticket: &str,
        provider: &str,
        token: &str,
    ) -> Result<SignInResult, AuthError> {
        let pending = match self.pending.open(ticket) {
            Ok(pending) => pending,
            Err(e) => {
                debug!(error = %e, "Pending two-factor ticket rejected");
                return Ok(SignInResult::Failed);
            }
        };

        let _guard = self.locks.lock(pending.user_id).await;

        let Some(user) = self.store.get_user_by_id(pending.user_id).await? else {
            return Ok(SignInResult::Failed);
        };
        if user.security_stamp != pending.security_stamp {
            debug!(user_id = %user.id, "Security stamp changed since password check");
            return Ok(SignInResult::Failed);
        }
        if user.is_locked_out(Utc::now()) {
            return Ok(SignInResult::LockedOut);
        }
        if !user.two_factor_enabled {
            debug!(user_id = %user.id, "Two-factor no longer enabled");
            return Ok(SignInResult::Failed);
        }

        self.check_second_factor(user, provider, token).await
    }

    /// Check a two-factor code outside of sign-in, for example to confirm
    /// enrollment. Runs under the user lock and counts wrong codes towards
    /// lockout the same way sign-in does.
    #[instrument(skip(self, token))]
    pub async fn verify_two_factor(
        &self,
        user_id: UserId,
        provider: &str,
        token: &str,
    ) -> Result<bool, AuthError> {
        let _guard = self.locks.lock(user_id).await;

        let Some(user) = self.store.get_user_by_id(user_id).await? else {
            return Ok(false);
        };
        if user.is_locked_out(Utc::now()) {
            debug!(user_id = %user.id, "Code check rejected, account locked out");
            return Ok(false);
        }
        Ok(self
            .check_second_factor(user, provider, token)
            .await?
            .is_success())
    }

    /// Caller holds the user lock
    async fn check_second_factor(
        &self,
        user: UserRecord,
        provider: &str,
        token: &str,
    ) -> Result<SignInResult, AuthError> {
        match self.registry.verify(&user, provider, token).await {
            Ok(()) => {
                if user.access_failed_count > 0 {
                    self.store.reset_access_failed(user.id).await?;
                }
                Ok(SignInResult::Success(user))
            }
            Err(e) if e.is_recoverable() => {
                debug!(user_id = %user.id, provider, error = %e, "Second factor rejected");
                self.record_failure(&user).await
            }
            Err(e) => Err(e),
        }
    }

    /// Create a session carrying the user's current stamp, validated now
    pub fn establish_session(&self, user: &UserRecord, authentication_type: &str) -> Session {
        let session = Session::new(
            user.id,
            user.security_stamp.clone(),
            authentication_type,
            user_claims(user),
            Utc::now(),
        );
        self.principals.observe(&AuthStateChange::SignedIn {
            user_id: user.id,
            session_id: session.id,
        });
        session
    }

    /// End a session
    pub fn sign_out(&self, session: &Session) {
        debug!(user_id = %session.user_id, session_id = %session.id, "Signed out");
        self.principals.observe(&AuthStateChange::SignedOut {
            user_id: session.user_id,
            session_id: session.id,
        });
    }

    /// Count a failed attempt; locks the account when the limit is reached
    async fn record_failure(&self, user: &UserRecord) -> Result<SignInResult, AuthError> {
        if !self.lockout.enabled || !user.lockout_enabled {
            return Ok(SignInResult::Failed);
        }

        let failures = self.store.increment_access_failed(user.id).await?;
        if failures < self.lockout.max_failed_access_attempts {
            return Ok(SignInResult::Failed);
        }

        let until = Utc::now() + chrono_duration(self.lockout.default_lockout);
        self.store.set_lockout_end(user.id, Some(until)).await?;
        self.store.reset_access_failed(user.id).await?;
        warn!(user_id = %user.id, failures, %until, "Account locked out");
        Ok(SignInResult::LockedOut)
    }

    fn burn_decoy(&self, password: &str) {
        let _ = self.hasher.verify(&self.decoy_hash, password);
    }
}

impl<S: CredentialStore> std::fmt::Debug for SessionAuthenticator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("registry", &self.registry)
            .field("lockout", &self.lockout)
            .finish_non_exhaustive()
    }
}
