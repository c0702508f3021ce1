//! Bearer-token authentication and role checks.
//!
//! Tokens are issued elsewhere; this crate only verifies them, honours
//! revocations and resolves the caller's current role.

pub mod middleware;
pub mod models;
pub mod password;
pub mod token;

pub use middleware::AuthUser;
