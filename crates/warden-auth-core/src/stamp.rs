//! Security stamp validation
//!
//! A session carries the stamp that was current at sign-in. The stored stamp
//! changes whenever credentials change, so comparing the two tells whether the
//! session is stale. To bound store load the comparison runs at most once per
//! validation interval; a stamp change therefore takes effect for live
//! sessions within one interval, not instantly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use warden_store::CredentialStore;
use warden_types::Session;

use crate::config::chrono_duration;
use crate::locks::UserLocks;
use crate::metrics;
use crate::principal::{user_claims, ClaimsPrincipalBuilder};
use crate::state::AuthStateChange;
use crate::AuthError;

/// Result of validating a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StampValidation {
    /// Session may continue
    Valid,
    /// Stamp no longer matches (or the user is gone); the caller must end
    /// the session
    Invalidated,
}

impl StampValidation {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Periodic security stamp checker
pub struct SecurityStampValidator<S: CredentialStore> {
    store: Arc<S>,
    interval: Duration,
    locks: UserLocks,
    principals: ClaimsPrincipalBuilder,
}

impl<S: CredentialStore> SecurityStampValidator<S> {
    pub fn new(
        store: Arc<S>,
        interval: Duration,
        locks: UserLocks,
        principals: ClaimsPrincipalBuilder,
    ) -> Self {
        Self {
            store,
            interval,
            locks,
            principals,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Validate against the current time
    pub async fn validate(&self, session: &mut Session) -> Result<StampValidation, AuthError> {
        self.validate_at(session, Utc::now()).await
    }

    /// Validate against an explicit clock.
    ///
    /// Within the interval of `session.last_validated` this returns `Valid`
    /// without touching the store. Otherwise the stored stamp is compared;
    /// on a match the claim snapshot is refreshed and `last_validated` moves
    /// to `now`. On a mismatch the session is marked invalidated, and later
    /// calls return `Invalidated` with no store read and no further notice.
    #[instrument(skip(self, session), fields(user_id = %session.user_id, session_id = %session.id))]
    pub async fn validate_at(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<StampValidation, AuthError> {
        if session.invalidated {
            return Ok(StampValidation::Invalidated);
        }
        if session.since_validated(now) < chrono_duration(self.interval) {
            return Ok(StampValidation::Valid);
        }

        let _guard = self.locks.lock(session.user_id).await;

        let current = self.store.get_security_stamp(session.user_id).await?;
        if current.as_ref() != Some(&session.security_stamp) {
            debug!(
                user_missing = current.is_none(),
                "Security stamp mismatch, invalidating session"
            );
            return Ok(self.invalidate(session));
        }

        match self.store.get_user_by_id(session.user_id).await? {
            // Re-check: the stamp may have moved between the two reads
            Some(user) if user.security_stamp == session.security_stamp => {
                session.claims = user_claims(&user);
            }
            _ => return Ok(self.invalidate(session)),
        }

        session.last_validated = now;
        metrics::record_stamp_validation("valid");
        Ok(StampValidation::Valid)
    }

    fn invalidate(&self, session: &mut Session) -> StampValidation {
        session.invalidated = true;
        metrics::record_stamp_validation("invalidated");
        self.principals.observe(&AuthStateChange::SessionInvalidated {
            user_id: session.user_id,
            session_id: session.id,
        });
        StampValidation::Invalidated
    }
}

impl<S: CredentialStore> std::fmt::Debug for SecurityStampValidator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityStampValidator")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
