//! Claims-based authorization policies

use serde::{Deserialize, Serialize};
use warden_types::ClaimsPrincipal;

/// One condition a principal must meet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// At least one authenticated identity
    Authenticated,
    /// A claim of `claim_type`; when `allowed_values` is non-empty its value
    /// must be one of them
    Claim {
        claim_type: String,
        allowed_values: Vec<String>,
    },
    /// Membership in any of the roles
    Role { roles: Vec<String> },
    /// An authenticated identity whose authentication type is one of these
    AuthenticationType { schemes: Vec<String> },
}

impl Requirement {
    fn check(&self, principal: &ClaimsPrincipal) -> Result<(), String> {
        match self {
            Self::Authenticated => {
                if principal.is_authenticated() {
                    Ok(())
                } else {
                    Err("principal is not authenticated".to_string())
                }
            }
            Self::Claim {
                claim_type,
                allowed_values,
            } => {
                let satisfied = principal.find_all(claim_type).any(|c| {
                    allowed_values.is_empty() || allowed_values.iter().any(|v| *v == c.value)
                });
                if satisfied {
                    Ok(())
                } else if allowed_values.is_empty() {
                    Err(format!("missing claim '{claim_type}'"))
                } else {
                    Err(format!(
                        "claim '{claim_type}' must be one of [{}]",
                        allowed_values.join(", ")
                    ))
                }
            }
            Self::Role { roles } => {
                if roles.iter().any(|r| principal.is_in_role(r)) {
                    Ok(())
                } else {
                    Err(format!("requires role [{}]", roles.join(", ")))
                }
            }
            Self::AuthenticationType { schemes } => {
                let satisfied = principal.identities.iter().any(|identity| {
                    identity
                        .authentication_type
                        .as_deref()
                        .is_some_and(|t| !t.is_empty() && schemes.iter().any(|s| s == t))
                });
                if satisfied {
                    Ok(())
                } else {
                    Err(format!(
                        "requires authentication type [{}]",
                        schemes.join(", ")
                    ))
                }
            }
        }
    }
}

/// Outcome of evaluating a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationDecision {
    Allowed,
    Denied { reason: String },
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// A named set of requirements, all of which must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    pub name: String,
    pub requirements: Vec<Requirement>,
}

impl AuthorizationPolicy {
    pub fn builder(name: impl Into<String>) -> AuthorizationPolicyBuilder {
        AuthorizationPolicyBuilder {
            policy: Self {
                name: name.into(),
                requirements: Vec::new(),
            },
        }
    }

    /// Policy that only requires an authenticated principal
    pub fn authenticated() -> Self {
        Self::builder("authenticated")
            .require_authenticated_user()
            .build()
    }

    /// Evaluate requirements in order; the first failure decides
    pub fn authorize(&self, principal: &ClaimsPrincipal) -> AuthorizationDecision {
        for requirement in &self.requirements {
            if let Err(reason) = requirement.check(principal) {
                tracing::debug!(
                    policy = %self.name,
                    user_id = principal.user_id().unwrap_or("-"),
                    %reason,
                    "Authorization denied"
                );
                return AuthorizationDecision::Denied { reason };
            }
        }
        AuthorizationDecision::Allowed
    }
}

/// Fluent construction of an [`AuthorizationPolicy`]
#[derive(Debug, Clone)]
pub struct AuthorizationPolicyBuilder {
    policy: AuthorizationPolicy,
}

impl AuthorizationPolicyBuilder {
    pub fn require_authenticated_user(mut self) -> Self {
        self.policy.requirements.push(Requirement::Authenticated);
        self
    }

    pub fn require_claim(mut self, claim_type: impl Into<String>) -> Self {
        self.policy.requirements.push(Requirement::Claim {
            claim_type: claim_type.into(),
            allowed_values: Vec::new(),
        });
        self
    }

    pub fn require_claim_value<I, V>(mut self, claim_type: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.policy.requirements.push(Requirement::Claim {
            claim_type: claim_type.into(),
            allowed_values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn require_role<I, V>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.policy.requirements.push(Requirement::Role {
            roles: roles.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn require_authentication_type<I, V>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.policy
            .requirements
            .push(Requirement::AuthenticationType {
                schemes: schemes.into_iter().map(Into::into).collect(),
            });
        self
    }

    pub fn build(self) -> AuthorizationPolicy {
        self.policy
    }
}
