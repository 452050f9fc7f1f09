//! Auth service - ties together sign-in, stamp validation, principals,
//! two-factor providers, account management and session tickets

use std::sync::Arc;
use warden_store::{CredentialStore, UserRecord};
use warden_types::{Claim, ClaimsPrincipal, Session, UserId};

use crate::{
    account::AccountManager,
    authenticator::{SessionAuthenticator, SignInResult},
    authorization::{AuthorizationDecision, AuthorizationPolicy},
    config::AuthConfig,
    crypto::HmacKey,
    locks::UserLocks,
    password::{Argon2Hasher, PasswordHasher},
    principal::ClaimsPrincipalBuilder,
    stamp::{SecurityStampValidator, StampValidation},
    state::{AuthStateChange, DefaultStateChangePolicy, StateChangePolicy, SubscriptionId},
    ticket::TicketProtector,
    totp::AuthenticatorTokenProvider,
    two_factor::{StampedCodeProvider, TwoFactorRegistry},
    AuthError,
};

/// Authentication service
///
/// Provides unified interface for:
/// - Password sign-in with lockout and the two-factor decision
/// - Periodic security stamp validation of live sessions
/// - Claims principals and authorization policies
/// - Two-factor token generation and validation
/// - Account mutations that rotate the security stamp
/// - Signed session tickets
pub struct AuthService<S: CredentialStore + 'static> {
    config: AuthConfig,
    store: Arc<S>,
    principals: ClaimsPrincipalBuilder,
    registry: Arc<TwoFactorRegistry>,
    authenticator: SessionAuthenticator<S>,
    validator: SecurityStampValidator<S>,
    accounts: AccountManager<S>,
    tickets: TicketProtector,
}

impl<S: CredentialStore + 'static> AuthService<S> {
    /// Argon2id hashing plus the Email, Phone and Authenticator providers
    pub fn with_defaults(config: AuthConfig, store: Arc<S>) -> Result<Self, AuthError> {
        config
            .validate()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher::new(config.pepper.clone()));
        let registry = default_registry(&config, store.clone())?;
        Self::new(config, store, hasher, registry)
    }

    /// Create with an explicit hasher and provider set
    pub fn new(
        config: AuthConfig,
        store: Arc<S>,
        hasher: Arc<dyn PasswordHasher>,
        registry: TwoFactorRegistry,
    ) -> Result<Self, AuthError> {
        Self::from_parts(
            config,
            store,
            hasher,
            registry,
            Arc::new(DefaultStateChangePolicy),
        )
    }

    /// Create with a custom notion of what counts as a state change
    pub fn from_parts(
        config: AuthConfig,
        store: Arc<S>,
        hasher: Arc<dyn PasswordHasher>,
        registry: TwoFactorRegistry,
        policy: Arc<dyn StateChangePolicy>,
    ) -> Result<Self, AuthError> {
        config
            .validate()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        let locks = UserLocks::new();
        let principals = ClaimsPrincipalBuilder::with_policy(policy);
        let registry = Arc::new(registry);

        let authenticator = SessionAuthenticator::try_new(
            &config,
            store.clone(),
            hasher.clone(),
            registry.clone(),
            locks.clone(),
            principals.clone(),
        )?;
        let validator = SecurityStampValidator::new(
            store.clone(),
            config.validation_interval,
            locks.clone(),
            principals.clone(),
        );
        let accounts = AccountManager::new(
            store.clone(),
            hasher,
            config.password_policy.clone(),
            locks,
            principals.clone(),
            config.totp_issuer.clone(),
        );
        let tickets = TicketProtector::new(config.ticket_secret.as_bytes(), config.ticket_lifetime)?;

        Ok(Self {
            config,
            store,
            principals,
            registry,
            authenticator,
            validator,
            accounts,
            tickets,
        })
    }

    // =========================================================================
    // Sign-in
    // =========================================================================

    /// Check credentials; see [`SessionAuthenticator::authenticate`]
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SignInResult, AuthError> {
        self.authenticator.authenticate(identifier, password).await
    }

    /// Complete a sign-in that required a second factor, presenting the
    /// pending ticket from `SignInResult::RequiresTwoFactor`
    pub async fn two_factor_sign_in(
        &self,
        ticket: &str,
        provider: &str,
        token: &str,
    ) -> Result<SignInResult, AuthError> {
        self.authenticator
            .two_factor_sign_in(ticket, provider, token)
            .await
    }

    /// Session for a successful sign-in, using the configured
    /// authentication type
    pub fn establish_session(&self, user: &UserRecord) -> Session {
        self.authenticator
            .establish_session(user, &self.config.authentication_type)
    }

    pub fn sign_out(&self, session: &Session) {
        self.authenticator.sign_out(session);
    }

    // =========================================================================
    // Session validation
    // =========================================================================

    /// Re-check the session's stamp if the validation interval has elapsed
    pub async fn validate(&self, session: &mut Session) -> Result<StampValidation, AuthError> {
        self.validator.validate(session).await
    }

    /// Sign a session for transport
    pub fn protect(&self, session: &Session) -> Result<String, AuthError> {
        self.tickets.protect(session)
    }

    /// Verify a ticket and validate the session inside it.
    ///
    /// `Ok(None)` when the session was invalidated by a stamp change. Callers
    /// should re-issue the ticket when the returned session's
    /// `last_validated` moved.
    pub async fn authenticate_ticket(&self, ticket: &str) -> Result<Option<Session>, AuthError> {
        let mut session = self.tickets.unprotect(ticket)?;
        match self.validator.validate(&mut session).await? {
            StampValidation::Valid => Ok(Some(session)),
            StampValidation::Invalidated => Ok(None),
        }
    }

    // =========================================================================
    // Principals and authorization
    // =========================================================================

    /// Principal with one identity; see [`ClaimsPrincipalBuilder::build`]
    pub fn build(&self, authentication_type: &str, claims: Vec<Claim>) -> ClaimsPrincipal {
        self.principals.build(authentication_type, claims)
    }

    pub fn principal(&self, session: &Session) -> ClaimsPrincipal {
        self.principals.principal_for_session(session)
    }

    pub fn authorize(
        &self,
        policy: &AuthorizationPolicy,
        principal: &ClaimsPrincipal,
    ) -> AuthorizationDecision {
        policy.authorize(principal)
    }

    /// Register for authentication state changes
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AuthStateChange) + Send + Sync + 'static,
    {
        self.principals.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.principals.unsubscribe(id)
    }

    /// Announce an externally caused change (e.g. profile edit) through the
    /// configured state change policy
    pub fn observe(&self, change: &AuthStateChange) -> bool {
        self.principals.observe(change)
    }

    // =========================================================================
    // Two-factor
    // =========================================================================

    /// Providers that can serve the user
    pub async fn two_factor_providers(&self, user_id: UserId) -> Result<Vec<String>, AuthError> {
        let user = self.load_user(user_id).await?;
        Ok(self.registry.providers_for(&user))
    }

    /// Issue a code from the named provider
    pub async fn generate_two_factor_token(
        &self,
        user_id: UserId,
        provider: &str,
    ) -> Result<String, AuthError> {
        let user = self.load_user(user_id).await?;
        self.registry.generate(&user, provider).await
    }

    /// Check and consume a code. `Ok(false)` for any rejection; wrong codes
    /// count towards lockout.
    pub async fn validate_two_factor_token(
        &self,
        user_id: UserId,
        provider: &str,
        token: &str,
    ) -> Result<bool, AuthError> {
        self.authenticator
            .verify_two_factor(user_id, provider, token)
            .await
    }

    /// Drop expired ledger entries, returning how many were removed
    pub async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        Ok(self
            .store
            .purge_expired_tokens(chrono::Utc::now())
            .await?)
    }

    async fn load_user(&self, user_id: UserId) -> Result<UserRecord, AuthError> {
        self.store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn accounts(&self) -> &AccountManager<S> {
        &self.accounts
    }

    pub fn authenticator(&self) -> &SessionAuthenticator<S> {
        &self.authenticator
    }

    pub fn validator(&self) -> &SecurityStampValidator<S> {
        &self.validator
    }

    pub fn registry(&self) -> &TwoFactorRegistry {
        &self.registry
    }

    pub fn principals(&self) -> &ClaimsPrincipalBuilder {
        &self.principals
    }

    pub fn tickets(&self) -> &TicketProtector {
        &self.tickets
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: CredentialStore + 'static> std::fmt::Debug for AuthService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("registry", &self.registry)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

/// Email, Phone and Authenticator providers sharing the token secret
pub fn default_registry<S: CredentialStore + 'static>(
    config: &AuthConfig,
    store: Arc<S>,
) -> Result<TwoFactorRegistry, AuthError> {
    let key = HmacKey::new(config.token_secret.as_bytes())
        .map_err(|e| AuthError::Configuration(e.to_string()))?;
    let store: Arc<dyn CredentialStore> = store;

    let mut registry = TwoFactorRegistry::new();
    registry.register(Arc::new(StampedCodeProvider::email(
        store.clone(),
        key.clone(),
        config.two_factor_token_lifespan,
    )));
    registry.register(Arc::new(StampedCodeProvider::phone(
        store.clone(),
        key,
        config.two_factor_token_lifespan,
    )));
    registry.register(Arc::new(AuthenticatorTokenProvider::new(
        store,
        config.totp_issuer.clone(),
    )));
    Ok(registry)
}
