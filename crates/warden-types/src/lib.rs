//! Warden Types - Shared domain types
//!
//! This crate contains domain types used across the Warden crates:
//! - User identity and security stamps
//! - Sessions established after sign-in
//! - Claims, claims identities and claims principals

pub mod claims;
pub mod session;
pub mod user;

pub use claims::*;
pub use session::*;
pub use user::*;
