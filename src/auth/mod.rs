//! Authentication module
//!
//! Token codec, refresh session identifiers, and password hashing.

mod claims;
mod jwt;
mod password;
mod refresh_token;

pub use claims::{AccessClaims, RefreshClaims, TokenKind, VerifiedClaims};
pub use jwt::{SignedToken, TokenCodec};
pub use password::{hash_password, verify_password};
pub use refresh_token::{generate_identifier, hash_identifier};
