//! Refresh Session Identifiers
//!
//! Every refresh session is keyed by a random identifier (`jti`) that travels
//! inside the signed refresh token. Only its SHA-256 hash is ever persisted,
//! so a leaked session table cannot be turned back into usable tokens.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

const IDENTIFIER_LENGTH: usize = 64;

/// Generate a new cryptographically secure session identifier
pub fn generate_identifier() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(IDENTIFIER_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a session identifier for storage lookup
pub fn hash_identifier(identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    format!("{:x}", hasher.finalize())
}
