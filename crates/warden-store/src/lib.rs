//! Warden Store - Credential store abstractions
//!
//! The authentication core only talks to the [`CredentialStore`] trait.
//! [`MemoryStore`] is an in-process implementation for embedding and tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_store::{CredentialStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let user = store.get_user_by_identifier("alice@example.com").await?;
//! ```

pub mod error;
pub mod memory;
pub mod models;
pub mod repo;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use models::*;
pub use repo::*;
