//! Password hashing and composition policy
//!
//! Hashing is behind the [`PasswordHasher`] trait so hosts can plug their own
//! scheme; [`Argon2Hasher`] (Argon2id, PHC strings) is the default.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, Params, PasswordVerifier};
use std::collections::HashSet;
use warden_store::PasswordHash;

use crate::AuthError;

/// Algorithm tag written next to Argon2id hashes
pub const ARGON2ID: &str = "argon2id";

/// Pluggable password hasher
pub trait PasswordHasher: Send + Sync {
    /// Tag identifying hashes this hasher produces
    fn algorithm(&self) -> &str;

    /// Hash a plaintext password
    fn hash(&self, password: &str) -> Result<PasswordHash, AuthError>;

    /// Verify a plaintext password against a stored hash
    ///
    /// `Ok(false)` on mismatch; `Err(AuthError::Crypto)` if the stored hash is
    /// malformed or was produced by another algorithm.
    fn verify(&self, hash: &PasswordHash, password: &str) -> Result<bool, AuthError>;
}

/// Argon2id hasher with an optional pepper
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    pepper: Option<String>,
}

impl Argon2Hasher {
    /// Hasher with the crate's default (OWASP) parameters
    pub fn new(pepper: Option<String>) -> Self {
        Self {
            argon2: Argon2::default(),
            pepper,
        }
    }

    /// Hasher with explicit cost parameters
    pub fn with_params(
        m_cost: u32,
        t_cost: u32,
        p_cost: u32,
        pepper: Option<String>,
    ) -> Result<Self, AuthError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| AuthError::Crypto(format!("argon2 params: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
            pepper,
        })
    }

    fn peppered<'a>(&self, password: &'a str, buf: &'a mut String) -> &'a [u8] {
        match &self.pepper {
            Some(p) => {
                buf.push_str(p);
                buf.push_str(password);
                buf.as_bytes()
            }
            None => password.as_bytes(),
        }
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher")
            .field("peppered", &self.pepper.is_some())
            .finish_non_exhaustive()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn algorithm(&self) -> &str {
        ARGON2ID
    }

    fn hash(&self, password: &str) -> Result<PasswordHash, AuthError> {
        use argon2::PasswordHasher as _;

        let mut buf = String::new();
        let input = self.peppered(password, &mut buf);
        let salt = SaltString::generate(&mut OsRng);
        let phc = self
            .argon2
            .hash_password(input, &salt)
            .map_err(|e| AuthError::Crypto(format!("argon2 hash: {e}")))?
            .to_string();
        Ok(PasswordHash::new(ARGON2ID, phc))
    }

    fn verify(&self, hash: &PasswordHash, password: &str) -> Result<bool, AuthError> {
        if hash.algorithm != ARGON2ID {
            return Err(AuthError::Crypto(format!(
                "unsupported hash algorithm: {}",
                hash.algorithm
            )));
        }
        let parsed = argon2::PasswordHash::new(&hash.value)
            .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

        let mut buf = String::new();
        let input = self.peppered(password, &mut buf);
        match self.argon2.verify_password(input, &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
        }
    }
}

/// Password composition policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub required_length: usize,
    pub required_unique_chars: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            required_length: 6,
            required_unique_chars: 1,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
        }
    }
}

/// A single policy violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordViolation {
    TooShort { required: usize },
    TooFewUniqueChars { required: usize },
    MissingDigit,
    MissingLowercase,
    MissingUppercase,
    MissingNonAlphanumeric,
}

impl std::fmt::Display for PasswordViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { required } => {
                write!(f, "must be at least {required} characters")
            }
            Self::TooFewUniqueChars { required } => {
                write!(f, "must use at least {required} different characters")
            }
            Self::MissingDigit => f.write_str("must contain a digit"),
            Self::MissingLowercase => f.write_str("must contain a lowercase letter"),
            Self::MissingUppercase => f.write_str("must contain an uppercase letter"),
            Self::MissingNonAlphanumeric => {
                f.write_str("must contain a non-alphanumeric character")
            }
        }
    }
}

/// Every violation found for a rejected password
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct PasswordPolicyError(pub Vec<PasswordViolation>);

impl PasswordPolicy {
    /// Check a candidate password, collecting every violation
    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        let mut violations = Vec::new();

        if password.chars().count() < self.required_length {
            violations.push(PasswordViolation::TooShort {
                required: self.required_length,
            });
        }
        if self.require_non_alphanumeric && password.chars().all(char::is_alphanumeric) {
            violations.push(PasswordViolation::MissingNonAlphanumeric);
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PasswordViolation::MissingDigit);
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            violations.push(PasswordViolation::MissingLowercase);
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            violations.push(PasswordViolation::MissingUppercase);
        }
        let unique = password.chars().collect::<HashSet<_>>().len();
        if unique < self.required_unique_chars {
            violations.push(PasswordViolation::TooFewUniqueChars {
                required: self.required_unique_chars,
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PasswordPolicyError(violations))
        }
    }
}
