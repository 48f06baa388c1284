//! JWT Token Codec
//!
//! Stateless signing and verification of access and refresh tokens.
//! Each kind has its own secret and TTL; the codec knows nothing about
//! session storage.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims, TokenKind, VerifiedClaims};
use crate::configuration::JwtSettings;
use crate::error::TokenError;

/// A freshly signed token with the bounds baked into its claims
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            access: KeyPair::from_secret(&config.access_secret),
            refresh: KeyPair::from_secret(&config.refresh_secret),
            access_ttl: Duration::seconds(config.access_token_expiry),
            refresh_ttl: Duration::seconds(config.refresh_token_expiry),
            issuer: config.issuer.clone(),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign an access token for `user_id` with the given role.
    pub fn sign_access(&self, user_id: Uuid, role: &str) -> Result<SignedToken, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims::new(user_id, role, now, self.access_ttl, &self.issuer);
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(SignedToken {
            token,
            issued_at: now,
            expires_at: now + self.access_ttl,
        })
    }

    /// Sign a refresh token carrying a caller-generated session identifier.
    pub fn sign_refresh(&self, user_id: Uuid, jti: &str) -> Result<SignedToken, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims::new(user_id, jti, now, self.refresh_ttl, &self.issuer);
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(SignedToken {
            token,
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        })
    }

    /// Verify a token of the given kind.
    ///
    /// Signature and structure are checked first (`TokenError::Invalid`), then
    /// expiry against the wall clock (`TokenError::Expired` once `now >= exp`).
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<VerifiedClaims, TokenError> {
        match kind {
            TokenKind::Access => self.verify_access(token).map(VerifiedClaims::Access),
            TokenKind::Refresh => self.verify_refresh(token).map(VerifiedClaims::Refresh),
        }
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode(token, &self.access.decoding)?;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::Invalid);
        }
        if claims.is_expired_at(Utc::now()) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode(token, &self.refresh.decoding)?;
        if claims.kind != TokenKind::Refresh || claims.jti.is_empty() {
            return Err(TokenError::Invalid);
        }
        if claims.is_expired_at(Utc::now()) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn decode<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // Expiry is compared by hand so that `now == exp` already counts as expired.
        validation.validate_exp = false;
        validation.leeway = 0;

        decode::<T>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => {
                        tracing::debug!(error = %e, "JWT verification failed");
                        TokenError::Invalid
                    }
                }
            })
    }
}
