//! Auth errors

use thiserror::Error;
use warden_store::StoreError;

use crate::password::PasswordPolicyError;

/// Authentication errors
///
/// Everything except [`AuthError::Store`], [`AuthError::Crypto`] and
/// [`AuthError::Configuration`] is a recoverable outcome the caller decides
/// how to handle (retry, prompt for a second factor, end the session).
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown user. Reported exactly like `InvalidCredentials` to callers.
    #[error("invalid credentials")]
    NotFound,

    /// Invalid credentials (wrong password, etc.)
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account is locked out
    #[error("account locked out")]
    LockedOut,

    /// Credentials were valid but a second factor is needed
    #[error("two-factor authentication required")]
    RequiresTwoFactor,

    /// Security stamp changed since the session or token was issued
    #[error("security stamp mismatch")]
    StampMismatch,

    /// Token has expired
    #[error("token expired")]
    TokenExpired,

    /// Single-use token presented a second time
    #[error("token already used")]
    TokenAlreadyUsed,

    /// No two-factor provider under this name (or it cannot serve the user)
    #[error("two-factor provider not registered: {0}")]
    ProviderNotRegistered(String),

    /// Invalid token (malformed, bad signature, unknown code)
    #[error("invalid token")]
    InvalidToken,

    /// Password does not satisfy the configured policy
    #[error("password rejected: {0}")]
    PasswordPolicy(#[from] PasswordPolicyError),

    /// User name or email already registered
    #[error("duplicate user: {0}")]
    DuplicateUser(String),

    /// Hashing or signing failure
    #[error("cryptography error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credential store failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl AuthError {
    /// Whether the caller can act on this outcome (as opposed to an
    /// infrastructure failure)
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::Crypto(_) | Self::Configuration(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound
            | Self::InvalidCredentials
            | Self::StampMismatch
            | Self::TokenExpired
            | Self::TokenAlreadyUsed
            | Self::InvalidToken => 401,
            Self::RequiresTwoFactor | Self::LockedOut => 403,
            Self::ProviderNotRegistered(_) | Self::PasswordPolicy(_) => 400,
            Self::DuplicateUser(_) => 409,
            Self::Crypto(_) | Self::Configuration(_) => 500,
            Self::Store(_) => 503,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            // Same code for both so user enumeration is not possible
            Self::NotFound | Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::LockedOut => "LOCKED_OUT",
            Self::RequiresTwoFactor => "REQUIRES_TWO_FACTOR",
            Self::StampMismatch => "STAMP_MISMATCH",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenAlreadyUsed => "TOKEN_ALREADY_USED",
            Self::ProviderNotRegistered(_) => "PROVIDER_NOT_REGISTERED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::PasswordPolicy(_) => "PASSWORD_POLICY",
            Self::DuplicateUser(_) => "DUPLICATE_USER",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Lower-case label for metrics
    pub(crate) fn metric_label(&self) -> &'static str {
        match self {
            Self::NotFound | Self::InvalidCredentials => "invalid_credentials",
            Self::LockedOut => "locked_out",
            Self::RequiresTwoFactor => "requires_two_factor",
            Self::StampMismatch => "stamp_mismatch",
            Self::TokenExpired => "expired",
            Self::TokenAlreadyUsed => "already_used",
            Self::ProviderNotRegistered(_) => "provider_not_registered",
            Self::InvalidToken => "invalid",
            Self::PasswordPolicy(_) => "password_policy",
            Self::DuplicateUser(_) => "duplicate_user",
            Self::Crypto(_) | Self::Configuration(_) | Self::Store(_) => "error",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Conflict(msg) => Self::DuplicateUser(msg),
            StoreError::Unavailable(_) => {
                tracing::error!("Credential store error: {}", err);
                Self::Store(err)
            }
        }
    }
}
