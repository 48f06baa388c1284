//! Refresh token rotation and revocation service.
//!
//! Issues short-lived access tokens paired with single-use refresh tokens,
//! rotates the refresh token on every renewal, detects replay of a consumed
//! token, and revokes sessions individually or per user.

pub mod auth;
pub mod configuration;
pub mod credentials;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod revocation;
pub mod rotation;
pub mod routes;
pub mod session;
pub mod startup;
pub mod telemetry;
