//! Authentication state change notification
//!
//! [`AuthStateNotifier::notify_changed`] is the single delivery path: every
//! subscriber is called synchronously, exactly once per change. What counts
//! as a change is decided separately by a [`StateChangePolicy`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use warden_types::{SessionId, UserId};

/// Something that may alter the principal built for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthStateChange {
    SignedIn {
        user_id: UserId,
        session_id: SessionId,
    },
    SignedOut {
        user_id: UserId,
        session_id: SessionId,
    },
    SessionInvalidated {
        user_id: UserId,
        session_id: SessionId,
    },
    ClaimsUpdated {
        user_id: UserId,
    },
    SecurityStampChanged {
        user_id: UserId,
    },
    TwoFactorChanged {
        user_id: UserId,
        enabled: bool,
    },
}

impl AuthStateChange {
    /// User the change concerns
    pub fn user_id(&self) -> UserId {
        match self {
            Self::SignedIn { user_id, .. }
            | Self::SignedOut { user_id, .. }
            | Self::SessionInvalidated { user_id, .. }
            | Self::ClaimsUpdated { user_id }
            | Self::SecurityStampChanged { user_id }
            | Self::TwoFactorChanged { user_id, .. } => *user_id,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignedIn { .. } => "signed_in",
            Self::SignedOut { .. } => "signed_out",
            Self::SessionInvalidated { .. } => "session_invalidated",
            Self::ClaimsUpdated { .. } => "claims_updated",
            Self::SecurityStampChanged { .. } => "security_stamp_changed",
            Self::TwoFactorChanged { .. } => "two_factor_changed",
        }
    }
}

/// Handle returned by [`AuthStateNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Subscriber callback
pub type StateChangeCallback = Arc<dyn Fn(&AuthStateChange) + Send + Sync>;

/// Registered observer set
#[derive(Default)]
pub struct AuthStateNotifier {
    next_id: AtomicU64,
    subscribers: DashMap<SubscriptionId, StateChangeCallback>,
}

impl AuthStateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AuthStateChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.insert(id, Arc::new(callback));
        id
    }

    /// Remove a callback. Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `change` to every current subscriber.
    ///
    /// Callbacks run outside the map's locks, so a callback may subscribe or
    /// unsubscribe without deadlocking. Delivery order is by subscription.
    pub fn notify_changed(&self, change: &AuthStateChange) {
        let mut callbacks: Vec<(SubscriptionId, StateChangeCallback)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        callbacks.sort_by_key(|(id, _)| *id);

        tracing::trace!(
            kind = change.kind(),
            user_id = %change.user_id(),
            subscribers = callbacks.len(),
            "Auth state changed"
        );
        for (_, callback) in callbacks {
            callback(change);
        }
    }
}

impl std::fmt::Debug for AuthStateNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStateNotifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Decides which changes are worth announcing
///
/// This is the overridable part; delivery always goes through
/// [`AuthStateNotifier::notify_changed`].
pub trait StateChangePolicy: Send + Sync {
    fn is_state_change(&self, change: &AuthStateChange) -> bool;
}

/// Announces every change
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStateChangePolicy;

impl StateChangePolicy for DefaultStateChangePolicy {
    fn is_state_change(&self, _change: &AuthStateChange) -> bool {
        true
    }
}
