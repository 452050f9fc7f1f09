//! Authenticator-app (RFC 6238 TOTP) provider and enrollment

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use warden_store::{CredentialStore, TokenRecord, UserRecord};

use crate::crypto::{constant_time_str_eq, hash_token};
use crate::two_factor::{provider_names, TwoFactorTokenProvider};
use crate::AuthError;

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;
/// Accepted clock drift, in steps either side of now
const SKEW: i64 = 1;

/// Create an enrollment: a fresh base32 secret and its `otpauth://` URI
///
/// Returns `(base32_secret, otpauth_uri)`.
pub fn new_enrollment(issuer: &str, account: &str) -> Result<(String, String), AuthError> {
    let secret = Secret::generate_secret();
    let base32 = secret.to_encoded().to_string();
    let uri = build_totp(&base32, issuer, account)?.get_url();
    Ok((base32, uri))
}

/// Generate a fresh base32 authenticator key
pub fn generate_key() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// `otpauth://` URI for an existing key
pub fn enrollment_uri(key: &str, issuer: &str, account: &str) -> Result<String, AuthError> {
    Ok(build_totp(key, issuer, account)?.get_url())
}

// Labels may not contain ':' in otpauth URIs.
fn sanitize_label(label: &str) -> String {
    label.replace(':', "_")
}

fn build_totp(key: &str, issuer: &str, account: &str) -> Result<TOTP, AuthError> {
    let secret = Secret::Encoded(key.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("authenticator key: {e:?}")))?;
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        0,
        STEP_SECS,
        secret,
        Some(sanitize_label(issuer)),
        sanitize_label(account),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

/// Time-based codes from an authenticator app
///
/// Codes are tied to the user's authenticator key; resetting the key also
/// regenerates the security stamp. Any other stamp rotation voids codes from
/// steps that began before it, and codes handed out by `generate` carry the
/// issuing stamp in the token ledger. Each accepted (step, code) pair is
/// marked used so a code works once.
pub struct AuthenticatorTokenProvider {
    store: Arc<dyn CredentialStore>,
    issuer: String,
}

impl AuthenticatorTokenProvider {
    pub fn new(store: Arc<dyn CredentialStore>, issuer: impl Into<String>) -> Self {
        Self {
            store,
            issuer: issuer.into(),
        }
    }

    fn totp_for(&self, user: &UserRecord) -> Result<TOTP, AuthError> {
        let key = user
            .authenticator_key
            .as_deref()
            .ok_or_else(|| AuthError::ProviderNotRegistered(provider_names::AUTHENTICATOR.into()))?;
        build_totp(key, &self.issuer, &user.user_name)
    }

    /// Code for an explicit clock, recorded in the ledger with the current
    /// stamp
    pub async fn generate_at(
        &self,
        user: &UserRecord,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let current = self.current(user).await?;
        let step = step_of(now)?;
        let code = self.totp_for(&current)?.generate(step as u64 * STEP_SECS);

        let token_hash = ledger_hash(step, &code);
        let existing = self
            .store
            .find_token(current.id, provider_names::AUTHENTICATOR, &token_hash)
            .await?;
        if existing.is_some() {
            return Ok(code);
        }
        self.store
            .insert_token(TokenRecord {
                user_id: current.id,
                provider: provider_names::AUTHENTICATOR.to_string(),
                token_hash,
                security_stamp: current.security_stamp.clone(),
                issued_at: now,
                expires_at: step_time(step + SKEW + 1)?,
                used_at: None,
            })
            .await?;
        Ok(code)
    }

    /// Verify against an explicit clock
    pub async fn verify_at(
        &self,
        user: &UserRecord,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let token = token.trim();
        if token.len() != DIGITS || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthError::InvalidToken);
        }

        let current = self.current(user).await?;
        if current.security_stamp != user.security_stamp {
            return Err(AuthError::StampMismatch);
        }

        let totp = self.totp_for(&current)?;
        let current_step = step_of(now)?;
        let matched = (-SKEW..=SKEW)
            .map(|offset| current_step + offset)
            .filter(|step| *step >= 0)
            .find(|step| {
                let expected = totp.generate(*step as u64 * STEP_SECS);
                constant_time_str_eq(&expected, token)
            })
            .ok_or(AuthError::InvalidToken)?;

        let step_start = step_time(matched)?;
        if let Some(cutoff) = rotation_cutoff(&current) {
            if step_start < cutoff {
                return Err(AuthError::StampMismatch);
            }
        }

        let token_hash = ledger_hash(matched, token);
        let issued = self
            .store
            .find_token(current.id, provider_names::AUTHENTICATOR, &token_hash)
            .await?;
        let record = match issued {
            Some(record) if record.is_used() => return Err(AuthError::TokenAlreadyUsed),
            Some(record) if record.security_stamp != current.security_stamp => {
                return Err(AuthError::StampMismatch)
            }
            Some(record) => record,
            None => TokenRecord {
                user_id: current.id,
                provider: provider_names::AUTHENTICATOR.to_string(),
                token_hash,
                security_stamp: current.security_stamp.clone(),
                issued_at: step_start,
                expires_at: step_time(matched + SKEW + 1)?,
                used_at: None,
            },
        };
        if !self.store.mark_token_used(record, now).await? {
            return Err(AuthError::TokenAlreadyUsed);
        }
        Ok(())
    }

    async fn current(&self, user: &UserRecord) -> Result<UserRecord, AuthError> {
        self.store
            .get_user_by_id(user.id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }
}

/// Start of the earliest step whose codes are still honoured, if a stamp
/// rotation after enrollment restricts them
fn rotation_cutoff(user: &UserRecord) -> Option<DateTime<Utc>> {
    match user.authenticator_key_set_at {
        Some(set_at) if set_at >= user.security_stamp_changed_at => None,
        _ => Some(user.security_stamp_changed_at),
    }
}

fn ledger_hash(step: i64, code: &str) -> String {
    hash_token(&format!("{step}:{code}"))
}

fn step_of(now: DateTime<Utc>) -> Result<i64, AuthError> {
    let secs = u64::try_from(now.timestamp())
        .map_err(|_| AuthError::Crypto("clock before epoch".into()))?;
    Ok((secs / STEP_SECS) as i64)
}

fn step_time(step: i64) -> Result<DateTime<Utc>, AuthError> {
    Utc.timestamp_opt(step * STEP_SECS as i64, 0)
        .single()
        .ok_or(AuthError::InvalidToken)
}

impl std::fmt::Debug for AuthenticatorTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatorTokenProvider")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TwoFactorTokenProvider for AuthenticatorTokenProvider {
    fn name(&self) -> &str {
        provider_names::AUTHENTICATOR
    }

    fn can_generate(&self, user: &UserRecord) -> bool {
        user.authenticator_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// The current code. Users normally read it from their app; hosts use
    /// this for diagnostics and tests.
    async fn generate(&self, user: &UserRecord) -> Result<String, AuthError> {
        self.generate_at(user, Utc::now()).await
    }

    async fn verify(&self, user: &UserRecord, token: &str) -> Result<(), AuthError> {
        self.verify_at(user, token, Utc::now()).await
    }
}
