//! JWT Claims structures
//!
//! Access tokens carry the user's role and are never looked up in storage.
//! Refresh tokens carry only the subject and the session identifier (`jti`);
//! the role is re-read from the credential store on every rotation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

/// Token kind, embedded as the `typ` claim so one kind can never pass as the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims for short-lived access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// User role at issuance time
    pub role: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

/// Claims for long-lived refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Session identifier; only its hash is persisted
    pub jti: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl AccessClaims {
    pub fn new(user_id: Uuid, role: &str, now: DateTime<Utc>, ttl: Duration, issuer: &str) -> Self {
        Self {
            sub: user_id.to_string(),
            role: role.to_string(),
            kind: TokenKind::Access,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        parse_subject(&self.sub)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

impl RefreshClaims {
    pub fn new(
        user_id: Uuid,
        jti: &str,
        now: DateTime<Utc>,
        ttl: Duration,
        issuer: &str,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            kind: TokenKind::Refresh,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        parse_subject(&self.sub)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// Claims produced by `TokenCodec::verify`
#[derive(Debug, Clone)]
pub enum VerifiedClaims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

impl VerifiedClaims {
    pub fn kind(&self) -> TokenKind {
        match self {
            VerifiedClaims::Access(_) => TokenKind::Access,
            VerifiedClaims::Refresh(_) => TokenKind::Refresh,
        }
    }
}

fn parse_subject(sub: &str) -> Result<Uuid, TokenError> {
    Uuid::parse_str(sub).map_err(|_| TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_claims_creation() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let claims = AccessClaims::new(user_id, "admin", now, Duration::seconds(900), "test");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 900);
        assert!(!claims.is_expired_at(now));
        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn test_refresh_claims_expiry_boundary() {
        let now = Utc::now();
        let claims = RefreshClaims::new(Uuid::new_v4(), "abc", now, Duration::seconds(60), "test");

        assert!(!claims.is_expired_at(now));
        assert!(claims.is_expired_at(now + Duration::seconds(60)));
        assert_eq!(claims.expires_at().timestamp(), claims.exp);
    }

    #[test]
    fn test_invalid_subject() {
        let mut claims =
            RefreshClaims::new(Uuid::new_v4(), "abc", Utc::now(), Duration::seconds(60), "test");
        claims.sub = "invalid-uuid".to_string();

        assert_eq!(claims.user_id(), Err(TokenError::Invalid));
    }
}
