//! Warden Auth Core - Authentication business logic
//!
//! Password sign-in with lockout, periodic security stamp validation of live
//! sessions, claims principals and authorization policies, and pluggable
//! two-factor token providers.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_auth_core::{AuthConfig, AuthService, SignInResult};
//! use warden_store::MemoryStore;
//!
//! let config = AuthConfig::from_env()?;
//! let service = AuthService::with_defaults(config, Arc::new(MemoryStore::new()))?;
//!
//! if let SignInResult::Success(user) = service.authenticate("alice", "Passw0rd!").await? {
//!     let mut session = service.establish_session(&user);
//!     let cookie = service.protect(&session)?;
//!     // on later requests
//!     if !service.validate(&mut session).await?.is_valid() {
//!         // force re-authentication
//!     }
//! }
//! ```

pub mod account;
pub mod authenticator;
pub mod authorization;
pub mod config;
pub mod crypto;
pub mod error;
pub mod locks;
pub mod metrics;
pub mod password;
pub mod principal;
pub mod service;
pub mod stamp;
pub mod state;
pub mod ticket;
pub mod totp;
pub mod two_factor;

pub use account::{AccountManager, AuthenticatorEnrollment, NewAccount};
pub use authenticator::{SessionAuthenticator, SignInResult};
pub use authorization::{AuthorizationDecision, AuthorizationPolicy, Requirement};
pub use config::{AuthConfig, ConfigError, LockoutOptions};
pub use crypto::{constant_time_eq, HmacKey};
pub use error::AuthError;
pub use locks::UserLocks;
pub use password::{
    Argon2Hasher, PasswordHasher, PasswordPolicy, PasswordPolicyError, PasswordViolation,
};
pub use principal::ClaimsPrincipalBuilder;
pub use service::AuthService;
pub use stamp::{SecurityStampValidator, StampValidation};
pub use state::{
    AuthStateChange, AuthStateNotifier, DefaultStateChangePolicy, StateChangePolicy,
    SubscriptionId,
};
pub use ticket::{PendingTwoFactor, PendingTwoFactorProtector, TicketPayload, TicketProtector};
pub use totp::AuthenticatorTokenProvider;
pub use two_factor::{
    provider_names, StampedCodeProvider, TwoFactorRegistry, TwoFactorTokenProvider,
};
