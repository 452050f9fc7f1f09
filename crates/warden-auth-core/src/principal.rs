//! Claims principal construction

use std::sync::Arc;
use warden_store::UserRecord;
use warden_types::{claim_types, Claim, ClaimsIdentity, ClaimsPrincipal, Session};

use crate::state::{
    AuthStateChange, AuthStateNotifier, DefaultStateChangePolicy, StateChangePolicy,
    SubscriptionId,
};

/// Builds principals and announces changes that would alter them
#[derive(Clone)]
pub struct ClaimsPrincipalBuilder {
    notifier: Arc<AuthStateNotifier>,
    policy: Arc<dyn StateChangePolicy>,
}

impl ClaimsPrincipalBuilder {
    pub fn new() -> Self {
        Self::with_policy(Arc::new(DefaultStateChangePolicy))
    }

    /// Builder with a custom notion of what counts as a state change
    pub fn with_policy(policy: Arc<dyn StateChangePolicy>) -> Self {
        Self {
            notifier: Arc::new(AuthStateNotifier::new()),
            policy,
        }
    }

    /// Principal with exactly one identity carrying `authentication_type` and
    /// `claims`. An empty authentication type yields an unauthenticated
    /// principal regardless of the claims.
    pub fn build(&self, authentication_type: &str, claims: Vec<Claim>) -> ClaimsPrincipal {
        let auth_type = if authentication_type.is_empty() {
            None
        } else {
            Some(authentication_type.to_string())
        };
        ClaimsPrincipal::new(ClaimsIdentity::new(auth_type, claims))
    }

    /// Principal for a freshly signed-in user
    pub fn principal_for_user(
        &self,
        user: &UserRecord,
        authentication_type: &str,
    ) -> ClaimsPrincipal {
        self.build(authentication_type, user_claims(user))
    }

    /// Principal materialized from a session's claim snapshot
    pub fn principal_for_session(&self, session: &Session) -> ClaimsPrincipal {
        self.build(&session.authentication_type, session.claims.clone())
    }

    /// Report something that happened; subscribers hear about it only if the
    /// policy says it is a state change. Returns whether it was delivered.
    pub fn observe(&self, change: &AuthStateChange) -> bool {
        if !self.policy.is_state_change(change) {
            return false;
        }
        self.notify_changed(change);
        true
    }

    /// Deliver unconditionally
    pub fn notify_changed(&self, change: &AuthStateChange) {
        self.notifier.notify_changed(change);
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AuthStateChange) + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn notifier(&self) -> &AuthStateNotifier {
        &self.notifier
    }
}

impl Default for ClaimsPrincipalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClaimsPrincipalBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsPrincipalBuilder")
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

/// Claim set for a user: identifier, name, email, roles, stamp, then the
/// user's stored claims
pub fn user_claims(user: &UserRecord) -> Vec<Claim> {
    let mut claims = Vec::with_capacity(4 + user.roles.len() + user.claims.len());
    claims.push(Claim::new(claim_types::NAME_IDENTIFIER, user.id.to_string()));
    claims.push(Claim::new(claim_types::NAME, user.user_name.clone()));
    if let Some(email) = &user.email {
        claims.push(Claim::new(claim_types::EMAIL, email.clone()));
    }
    for role in &user.roles {
        claims.push(Claim::new(claim_types::ROLE, role.clone()));
    }
    claims.push(Claim::new(
        claim_types::SECURITY_STAMP,
        user.security_stamp.as_str(),
    ));
    claims.extend(user.claims.iter().cloned());
    claims
}
