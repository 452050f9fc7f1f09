//! Signed tickets
//!
//! Serializes a [`Session`] into an opaque `payload.signature` string a host
//! can put in a cookie. The payload is base64url JSON; the signature is
//! HMAC-SHA256 over a purpose label and the encoded payload, so a ticket
//! minted for one purpose never opens as another. Tickets are tamper-evident,
//! not encrypted: claims inside are readable by the holder.
//!
//! [`PendingTwoFactorProtector`] issues the short-lived ticket that carries a
//! password-verified sign-in over to its second factor.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use warden_types::{SecurityStamp, Session, UserId};

use crate::config::chrono_duration;
use crate::crypto::{constant_time_eq, HmacKey};
use crate::AuthError;

const SESSION_PURPOSE: &str = "warden.session";
const PENDING_TWO_FACTOR_PURPOSE: &str = "warden.two_factor";

/// Ticket contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPayload {
    pub session: Session,
    /// Absolute ticket expiry, independent of stamp validation
    pub expires_at: DateTime<Utc>,
}

impl TicketPayload {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A sign-in that passed the password check and awaits its second factor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTwoFactor {
    pub user_id: UserId,
    /// Stamp at password verification; any change since voids the ticket
    pub security_stamp: SecurityStamp,
    pub expires_at: DateTime<Utc>,
}

impl PendingTwoFactor {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone)]
struct Sealer {
    hmac_key: HmacKey,
    purpose: &'static str,
}

impl Sealer {
    fn new(secret: impl AsRef<[u8]>, purpose: &'static str) -> Result<Self, AuthError> {
        let hmac_key =
            HmacKey::new(secret).map_err(|e| AuthError::Configuration(e.to_string()))?;
        Ok(Self { hmac_key, purpose })
    }

    fn seal<T: Serialize>(&self, payload: &T) -> Result<String, AuthError> {
        let payload_json = serde_json::to_vec(payload).map_err(|e| {
            tracing::error!(purpose = self.purpose, "Failed to serialize ticket: {}", e);
            AuthError::Crypto("failed to serialize ticket".to_string())
        })?;

        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
        let signature = self.compute_signature(&payload_b64);
        Ok(format!("{payload_b64}.{signature}"))
    }

    fn open<T: DeserializeOwned>(&self, ticket: &str) -> Result<T, AuthError> {
        let Some((payload_b64, signature)) = ticket.rsplit_once('.') else {
            return Err(AuthError::InvalidToken);
        };

        let expected_sig = self.compute_signature(payload_b64);
        if !constant_time_eq(signature.as_bytes(), expected_sig.as_bytes()) {
            tracing::debug!(purpose = self.purpose, "Ticket signature mismatch");
            return Err(AuthError::InvalidToken);
        }

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)
    }

    fn compute_signature(&self, data: &str) -> String {
        URL_SAFE_NO_PAD.encode(
            self.hmac_key
                .sign_parts(&[self.purpose.as_bytes(), data.as_bytes()]),
        )
    }
}

/// Signs and verifies session tickets
#[derive(Clone)]
pub struct TicketProtector {
    sealer: Sealer,
    lifetime: Duration,
}

impl TicketProtector {
    /// Create a protector.
    ///
    /// # Errors
    /// `AuthError::Configuration` if the secret is shorter than 32 bytes.
    pub fn new(secret: impl AsRef<[u8]>, lifetime: Duration) -> Result<Self, AuthError> {
        Ok(Self {
            sealer: Sealer::new(secret, SESSION_PURPOSE)?,
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign a session, expiring `lifetime` after its sign-in time
    pub fn protect(&self, session: &Session) -> Result<String, AuthError> {
        self.sealer.seal(&TicketPayload {
            session: session.clone(),
            expires_at: session.issued_at + chrono_duration(self.lifetime),
        })
    }

    /// Verify a ticket and recover its session
    pub fn unprotect(&self, ticket: &str) -> Result<Session, AuthError> {
        self.unprotect_at(ticket, Utc::now())
    }

    /// Verify against an explicit clock
    pub fn unprotect_at(&self, ticket: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let payload: TicketPayload = self.sealer.open(ticket)?;
        if payload.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }
        Ok(payload.session)
    }
}

impl std::fmt::Debug for TicketProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketProtector")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

/// Issues and opens pending two-factor tickets
#[derive(Clone)]
pub struct PendingTwoFactorProtector {
    sealer: Sealer,
    lifetime: Duration,
}

impl PendingTwoFactorProtector {
    pub fn new(secret: impl AsRef<[u8]>, lifetime: Duration) -> Result<Self, AuthError> {
        Ok(Self {
            sealer: Sealer::new(secret, PENDING_TWO_FACTOR_PURPOSE)?,
            lifetime,
        })
    }

    /// Ticket for a user who has just passed the password check
    pub fn issue(&self, user_id: UserId, stamp: &SecurityStamp) -> Result<String, AuthError> {
        self.issue_at(user_id, stamp, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: UserId,
        stamp: &SecurityStamp,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.sealer.seal(&PendingTwoFactor {
            user_id,
            security_stamp: stamp.clone(),
            expires_at: now + chrono_duration(self.lifetime),
        })
    }

    pub fn open(&self, ticket: &str) -> Result<PendingTwoFactor, AuthError> {
        self.open_at(ticket, Utc::now())
    }

    pub fn open_at(&self, ticket: &str, now: DateTime<Utc>) -> Result<PendingTwoFactor, AuthError> {
        let pending: PendingTwoFactor = self.sealer.open(ticket)?;
        if pending.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }
        Ok(pending)
    }
}

impl std::fmt::Debug for PendingTwoFactorProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTwoFactorProtector")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use warden_types::{Claim, SecurityStamp, UserId};

    fn protector() -> TicketProtector {
        TicketProtector::new("test-secret-key-at-least-32-bytes!", Duration::from_secs(3600))
            .unwrap()
    }

    fn session() -> Session {
        Session::new(
            UserId::new(),
            SecurityStamp::generate(),
            "Identity.Application",
            vec![Claim::new("role", "admin")],
            Utc::now(),
        )
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = TicketProtector::new("short", Duration::from_secs(60));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_protect_unprotect() {
        let protector = protector();
        let session = session();
        let ticket = protector.protect(&session).unwrap();
        assert!(ticket.contains('.'));

        let restored = protector.unprotect(&ticket).unwrap();
        assert_eq!(restored.id, session.id);
        assert_eq!(restored.security_stamp, session.security_stamp);
        assert_eq!(restored.claims, session.claims);
    }

    #[test]
    fn test_tampered_ticket_rejected() {
        let protector = protector();
        let ticket = protector.protect(&session()).unwrap();

        let (payload, sig) = ticket.rsplit_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(payload).unwrap();
        bytes[10] ^= 0x01;
        let forged = format!("{}.{sig}", URL_SAFE_NO_PAD.encode(bytes));
        assert!(matches!(
            protector.unprotect(&forged),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_other_key_rejected() {
        let ticket = protector().protect(&session()).unwrap();
        let other =
            TicketProtector::new("another-secret-key-of-32-bytes!!!", Duration::from_secs(3600))
                .unwrap();
        assert!(matches!(other.unprotect(&ticket), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_malformed_ticket_rejected() {
        let protector = protector();
        assert!(matches!(protector.unprotect("no-dot"), Err(AuthError::InvalidToken)));
        assert!(matches!(protector.unprotect("a.b"), Err(AuthError::InvalidToken)));
        assert!(matches!(protector.unprotect(""), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_ticket_rejected() {
        let protector = protector();
        let session = session();
        let ticket = protector.protect(&session).unwrap();
        let later = session.issued_at + ChronoDuration::hours(2);
        assert!(matches!(
            protector.unprotect_at(&ticket, later),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_pending_ticket_round_trip() {
        let pending = PendingTwoFactorProtector::new(
            "test-secret-key-at-least-32-bytes!",
            Duration::from_secs(300),
        )
        .unwrap();
        let user_id = UserId::new();
        let stamp = SecurityStamp::generate();
        let now = Utc::now();

        let ticket = pending.issue_at(user_id, &stamp, now).unwrap();
        let opened = pending.open_at(&ticket, now).unwrap();
        assert_eq!(opened.user_id, user_id);
        assert_eq!(opened.security_stamp, stamp);
        assert!(matches!(
            pending.open_at(&ticket, now + ChronoDuration::minutes(6)),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_tickets_do_not_cross_purposes() {
        let secret = "test-secret-key-at-least-32-bytes!";
        let sessions = TicketProtector::new(secret, Duration::from_secs(3600)).unwrap();
        let pending = PendingTwoFactorProtector::new(secret, Duration::from_secs(300)).unwrap();

        let session_ticket = sessions.protect(&session()).unwrap();
        assert!(matches!(
            pending.open(&session_ticket),
            Err(AuthError::InvalidToken)
        ));

        let pending_ticket = pending
            .issue(UserId::new(), &SecurityStamp::generate())
            .unwrap();
        assert!(matches!(
            sessions.unprotect(&pending_ticket),
            Err(AuthError::InvalidToken)
        ));
    }
}
