//! Claims, claims identities and claims principals

use serde::{Deserialize, Serialize};

/// Well-known claim types
pub mod claim_types {
    /// Stable user identifier
    pub const NAME_IDENTIFIER: &str = "nameidentifier";
    /// Display user name
    pub const NAME: &str = "name";
    /// Email address
    pub const EMAIL: &str = "email";
    /// Role membership (one claim per role)
    pub const ROLE: &str = "role";
    /// Security stamp valid when the principal was issued
    pub const SECURITY_STAMP: &str = "security_stamp";
    /// Authentication method reference (e.g. "pwd", "mfa")
    pub const AUTHENTICATION_METHOD: &str = "amr";
}

/// Issuer used when a claim does not name one
pub const LOCAL_AUTHORITY: &str = "LOCAL AUTHORITY";

/// A single (type, value, issuer) statement about a subject
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `role`
    pub claim_type: String,
    /// Claim value
    pub value: String,
    /// Issuing authority
    pub issuer: String,
}

impl Claim {
    /// Create a claim issued by the local authority
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_issuer(claim_type, value, LOCAL_AUTHORITY)
    }

    /// Create a claim with an explicit issuer
    pub fn with_issuer(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: issuer.into(),
        }
    }

    /// Case-insensitive claim type comparison
    pub fn is_type(&self, claim_type: &str) -> bool {
        self.claim_type.eq_ignore_ascii_case(claim_type)
    }
}

/// A set of claims plus the authentication type that produced them
///
/// An identity is authenticated iff its authentication type is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    /// Authentication type marker (e.g. "Identity.Application")
    #[serde(default)]
    pub authentication_type: Option<String>,
    /// Claims carried by this identity
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    /// Create an identity
    pub fn new(authentication_type: Option<String>, claims: Vec<Claim>) -> Self {
        Self {
            authentication_type,
            claims,
        }
    }

    /// Whether this identity is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.authentication_type
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// First value of the `name` claim
    pub fn name(&self) -> Option<&str> {
        self.find_first(claim_types::NAME).map(|c| c.value.as_str())
    }

    /// First claim of the given type
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.is_type(claim_type))
    }

    /// Whether the identity has a claim with the given type and value
    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.is_type(claim_type) && c.value == value)
    }
}

/// Container of one or more identities consumed by authorization checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPrincipal {
    /// Identities making up the principal
    pub identities: Vec<ClaimsIdentity>,
}

impl ClaimsPrincipal {
    /// Wrap a single identity
    pub fn new(identity: ClaimsIdentity) -> Self {
        Self {
            identities: vec![identity],
        }
    }

    /// Principal with no authenticated identities
    pub fn anonymous() -> Self {
        Self::new(ClaimsIdentity::default())
    }

    /// Add another identity
    pub fn add_identity(&mut self, identity: ClaimsIdentity) {
        self.identities.push(identity);
    }

    /// Authenticated iff at least one identity is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.identities.iter().any(ClaimsIdentity::is_authenticated)
    }

    /// Number of authenticated identities
    pub fn authenticated_identities(&self) -> usize {
        self.identities
            .iter()
            .filter(|i| i.is_authenticated())
            .count()
    }

    /// The first authenticated identity, if any
    pub fn primary_identity(&self) -> Option<&ClaimsIdentity> {
        self.identities.iter().find(|i| i.is_authenticated())
    }

    /// All claims across every identity
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.identities.iter().flat_map(|i| i.claims.iter())
    }

    /// First claim of the given type across identities
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims().find(|c| c.is_type(claim_type))
    }

    /// Every claim of the given type
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims().filter(move |c| c.is_type(claim_type))
    }

    /// Whether any identity has a claim with the given type and value
    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.identities.iter().any(|i| i.has_claim(claim_type, value))
    }

    /// Role check against `role` claims
    pub fn is_in_role(&self, role: &str) -> bool {
        self.has_claim(claim_types::ROLE, role)
    }

    /// Value of the name identifier claim
    pub fn user_id(&self) -> Option<&str> {
        self.find_first(claim_types::NAME_IDENTIFIER)
            .map(|c| c.value.as_str())
    }
}
