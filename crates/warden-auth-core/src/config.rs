//! Configuration types for the auth core
//!
//! The core never reads configuration files. Hosts either build an
//! [`AuthConfig`] in code or pull it from `WARDEN_*` environment variables.

use std::time::Duration;

use crate::crypto::HmacKey;
use crate::password::PasswordPolicy;

/// Recommended lower bound for the stamp validation interval
pub const MIN_RECOMMENDED_VALIDATION_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Default authentication type stamped on sign-in principals
pub const DEFAULT_AUTHENTICATION_TYPE: &str = "Identity.Application";

/// Lockout options
#[derive(Debug, Clone)]
pub struct LockoutOptions {
    /// Whether failed attempts count towards lockout at all
    pub enabled: bool,
    /// Consecutive failures before the account is locked
    pub max_failed_access_attempts: u32,
    /// How long a lockout lasts
    pub default_lockout: Duration,
}

impl Default for LockoutOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_access_attempts: 5,
            default_lockout: Duration::from_secs(5 * 60), // 5 minutes
        }
    }
}

/// Auth core configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Maximum staleness between a session's stamp and the stored stamp
    pub validation_interval: Duration,
    /// Password composition policy
    pub password_policy: PasswordPolicy,
    /// Lockout options
    pub lockout: LockoutOptions,
    /// Lifetime of emailed/texted two-factor codes
    pub two_factor_token_lifespan: Duration,
    /// HMAC secret for two-factor code derivation
    pub token_secret: String,
    /// HMAC secret for session ticket signing
    pub ticket_secret: String,
    /// Absolute lifetime of a protected session ticket
    pub ticket_lifetime: Duration,
    /// How long a password-verified sign-in waits for its second factor
    pub pending_two_factor_lifetime: Duration,
    /// Authentication type for principals built at sign-in
    pub authentication_type: String,
    /// Optional pepper prepended to passwords before hashing
    pub pepper: Option<String>,
    /// Issuer shown in authenticator apps
    pub totp_issuer: String,
}

impl AuthConfig {
    /// Create a new auth config with default policies
    pub fn new(token_secret: impl Into<String>, ticket_secret: impl Into<String>) -> Self {
        Self {
            validation_interval: Duration::from_secs(30 * 60), // 30 minutes
            password_policy: PasswordPolicy::default(),
            lockout: LockoutOptions::default(),
            two_factor_token_lifespan: Duration::from_secs(3 * 60), // 3 minutes
            token_secret: token_secret.into(),
            ticket_secret: ticket_secret.into(),
            ticket_lifetime: Duration::from_secs(14 * 24 * 60 * 60), // 14 days
            pending_two_factor_lifetime: Duration::from_secs(5 * 60),
            authentication_type: DEFAULT_AUTHENTICATION_TYPE.to_string(),
            pepper: None,
            totp_issuer: "Warden".to_string(),
        }
    }

    /// Create a config, rejecting secrets shorter than the HMAC minimum
    pub fn try_new(
        token_secret: impl Into<String>,
        ticket_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self::new(token_secret, ticket_secret);
        config.validate()?;
        Ok(config)
    }

    /// Check secrets and intervals
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_secret.len() < HmacKey::MIN_KEY_LENGTH {
            return Err(ConfigError::Invalid(
                "token secret must be at least 32 bytes",
            ));
        }
        if self.ticket_secret.len() < HmacKey::MIN_KEY_LENGTH {
            return Err(ConfigError::Invalid(
                "ticket secret must be at least 32 bytes",
            ));
        }
        if self.authentication_type.is_empty() {
            return Err(ConfigError::Invalid("authentication type must not be empty"));
        }
        Ok(())
    }

    /// Set the stamp validation interval
    ///
    /// Values under two minutes are honoured but logged, since every session
    /// then hits the store that often.
    pub fn with_validation_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_RECOMMENDED_VALIDATION_INTERVAL {
            tracing::warn!(
                interval_secs = interval.as_secs(),
                "Security stamp validation interval is below the recommended 2 minute minimum"
            );
        }
        self.validation_interval = interval;
        self
    }

    /// Set the password policy
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    /// Set lockout options
    pub fn with_lockout(mut self, lockout: LockoutOptions) -> Self {
        self.lockout = lockout;
        self
    }

    /// Set the two-factor code lifespan
    pub fn with_two_factor_token_lifespan(mut self, lifespan: Duration) -> Self {
        self.two_factor_token_lifespan = lifespan;
        self
    }

    /// Set the ticket lifetime
    pub fn with_ticket_lifetime(mut self, lifetime: Duration) -> Self {
        self.ticket_lifetime = lifetime;
        self
    }

    /// Set how long a pending two-factor sign-in stays usable
    pub fn with_pending_two_factor_lifetime(mut self, lifetime: Duration) -> Self {
        self.pending_two_factor_lifetime = lifetime;
        self
    }

    /// Set the authentication type
    pub fn with_authentication_type(mut self, authentication_type: impl Into<String>) -> Self {
        self.authentication_type = authentication_type.into();
        self
    }

    /// Set the password pepper
    pub fn with_pepper(mut self, pepper: impl Into<String>) -> Self {
        self.pepper = Some(pepper.into());
        self
    }

    /// Set the authenticator app issuer
    pub fn with_totp_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.totp_issuer = issuer.into();
        self
    }

    /// Load configuration from environment variables
    ///
    /// Required: `WARDEN_TOKEN_SECRET`, `WARDEN_TICKET_SECRET`.
    /// Optional: `WARDEN_VALIDATION_INTERVAL_SECS`, `WARDEN_TOKEN_LIFESPAN_SECS`,
    /// `WARDEN_TICKET_LIFETIME_HOURS`, `WARDEN_PENDING_TWO_FACTOR_SECS`,
    /// `WARDEN_LOCKOUT_ENABLED`,
    /// `WARDEN_LOCKOUT_MAX_ATTEMPTS`, `WARDEN_LOCKOUT_MINUTES`,
    /// `WARDEN_PASSWORD_MIN_LENGTH`, `WARDEN_PASSWORD_UNIQUE_CHARS`,
    /// `WARDEN_PEPPER`, `WARDEN_TOTP_ISSUER`, `WARDEN_AUTHENTICATION_TYPE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token_secret =
            lookup("WARDEN_TOKEN_SECRET").ok_or(ConfigError::Missing("WARDEN_TOKEN_SECRET"))?;
        let ticket_secret =
            lookup("WARDEN_TICKET_SECRET").ok_or(ConfigError::Missing("WARDEN_TICKET_SECRET"))?;

        let parse_u64 = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            lookup(key)
                .map(|v| v.parse().map_err(|_| ConfigError::Invalid(key)))
                .unwrap_or(Ok(default))
        };

        let validation_interval_secs = parse_u64("WARDEN_VALIDATION_INTERVAL_SECS", 30 * 60)?;
        let token_lifespan_secs = parse_u64("WARDEN_TOKEN_LIFESPAN_SECS", 3 * 60)?;
        let ticket_lifetime_hours = parse_u64("WARDEN_TICKET_LIFETIME_HOURS", 14 * 24)?;
        let pending_secs = parse_u64("WARDEN_PENDING_TWO_FACTOR_SECS", 5 * 60)?;
        let lockout_minutes = parse_u64("WARDEN_LOCKOUT_MINUTES", 5)?;
        let max_attempts = parse_u64("WARDEN_LOCKOUT_MAX_ATTEMPTS", 5)?;
        let min_length = parse_u64("WARDEN_PASSWORD_MIN_LENGTH", 6)?;
        let unique_chars = parse_u64("WARDEN_PASSWORD_UNIQUE_CHARS", 1)?;

        let lockout_enabled = match lookup("WARDEN_LOCKOUT_ENABLED") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("WARDEN_LOCKOUT_ENABLED"))?,
            None => true,
        };

        let mut config = Self::new(token_secret, ticket_secret)
            .with_validation_interval(Duration::from_secs(validation_interval_secs))
            .with_two_factor_token_lifespan(Duration::from_secs(token_lifespan_secs))
            .with_ticket_lifetime(Duration::from_secs(ticket_lifetime_hours * 3600))
            .with_pending_two_factor_lifetime(Duration::from_secs(pending_secs))
            .with_lockout(LockoutOptions {
                enabled: lockout_enabled,
                max_failed_access_attempts: u32::try_from(max_attempts)
                    .map_err(|_| ConfigError::Invalid("WARDEN_LOCKOUT_MAX_ATTEMPTS"))?,
                default_lockout: Duration::from_secs(lockout_minutes * 60),
            });

        config.password_policy.required_length = min_length as usize;
        config.password_policy.required_unique_chars = unique_chars as usize;

        if let Some(pepper) = lookup("WARDEN_PEPPER") {
            config = config.with_pepper(pepper);
        }
        if let Some(issuer) = lookup("WARDEN_TOTP_ISSUER") {
            config = config.with_totp_issuer(issuer);
        }
        if let Some(auth_type) = lookup("WARDEN_AUTHENTICATION_TYPE") {
            config = config.with_authentication_type(auth_type);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value: {0}")]
    Invalid(&'static str),
}

/// Convert a std duration to chrono, saturating at one century
pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
