//! Common test utilities for warden-auth-core integration tests

#[allow(dead_code)]
pub mod stores;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use warden_auth_core::{
    service::default_registry, AccountManager, Argon2Hasher, AuthConfig, AuthError,
    AuthService, LockoutOptions, NewAccount, PasswordHasher,
};
use warden_store::{CredentialStore, PasswordHash, UserRecord};

#[allow(unused_imports)]
pub use stores::{CountingStore, FailingStore};

pub const PASSWORD: &str = "Passw0rd!";

/// Config with 32+ byte secrets and a 30 minute validation interval
pub fn test_config() -> AuthConfig {
    AuthConfig::new(
        "test-token-secret-at-least-32-bytes!!",
        "test-ticket-secret-at-least-32-bytes!",
    )
    .with_lockout(LockoutOptions {
        enabled: true,
        max_failed_access_attempts: 3,
        default_lockout: Duration::from_secs(5 * 60),
    })
}

/// Argon2id with minimal cost so tests stay fast
pub fn fast_hasher() -> Arc<dyn PasswordHasher> {
    Arc::new(Argon2Hasher::with_params(1024, 1, 1, None).expect("valid argon2 params"))
}

/// Wraps a hasher and counts `verify` calls
#[allow(dead_code)]
pub struct CountingHasher {
    inner: Arc<dyn PasswordHasher>,
    verifies: AtomicUsize,
}

#[allow(dead_code)]
impl CountingHasher {
    pub fn new(inner: Arc<dyn PasswordHasher>) -> Self {
        Self {
            inner,
            verifies: AtomicUsize::new(0),
        }
    }

    pub fn verifies(&self) -> usize {
        self.verifies.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.verifies.store(0, Ordering::SeqCst);
    }
}

impl PasswordHasher for CountingHasher {
    fn algorithm(&self) -> &str {
        self.inner.algorithm()
    }

    fn hash(&self, password: &str) -> Result<PasswordHash, AuthError> {
        self.inner.hash(password)
    }

    fn verify(&self, hash: &PasswordHash, password: &str) -> Result<bool, AuthError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(hash, password)
    }
}

/// Service over `store` with the default providers and the fast hasher
pub fn service<S: CredentialStore + 'static>(store: Arc<S>) -> AuthService<S> {
    let config = test_config();
    let registry = default_registry(&config, store.clone()).expect("registry");
    AuthService::new(config, store, fast_hasher(), registry).expect("service")
}

/// Register a user with email and phone on file
#[allow(dead_code)]
pub async fn register<S: CredentialStore>(accounts: &AccountManager<S>, name: &str) -> UserRecord {
    accounts
        .register(
            NewAccount::new(name, PASSWORD)
                .with_email(format!("{name}@example.com"))
                .with_phone_number("+15550100")
                .with_roles(["reader"]),
        )
        .await
        .expect("register")
}

/// Route tracing output through the test writer
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden_auth_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
