//! Refresh token rotation engine.
//!
//! Session state machine:
//!
//! ```text
//! Active --refresh()--> Rotated   (terminal)
//! Active --revoke-----> Revoked   (terminal)
//! ```
//!
//! A refresh token is single-use. Presenting one whose session is already
//! `Rotated` or `Revoked` is treated as theft: every active session of the
//! user is revoked and `RotationError::ReplayDetected` is returned. The loser
//! of a concurrent double-submit ends up on the same path, because at this
//! layer a duplicate retry cannot be told apart from an attacker.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{generate_identifier, hash_identifier, TokenCodec};
use crate::credentials::CredentialStore;
use crate::error::{RotationError, TokenError};
use crate::revocation::{RevocationCascade, RevocationReason};
use crate::session::{NewSession, Provenance, SessionRecordStore};

/// Access/refresh pair handed back to the transport layer
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token lifetime in seconds, used as the cookie max-age
    pub refresh_expires_in: i64,
}

/// What `revoke_one` ended up doing; never an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    AlreadyRevoked,
    SessionNotFound,
    /// The token could not be verified, so nothing was looked up
    Unverifiable,
    /// The store failed; logged and swallowed
    Failed,
}

pub struct RotationEngine {
    codec: TokenCodec,
    sessions: Arc<dyn SessionRecordStore>,
    credentials: Arc<dyn CredentialStore>,
    cascade: RevocationCascade,
}

impl RotationEngine {
    pub fn new(
        codec: TokenCodec,
        sessions: Arc<dyn SessionRecordStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let cascade = RevocationCascade::new(sessions.clone());
        Self {
            codec,
            sessions,
            credentials,
            cascade,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Start a new login session for `user_id`.
    pub async fn issue(
        &self,
        user_id: Uuid,
        role: &str,
        provenance: &Provenance,
    ) -> Result<TokenPair, RotationError> {
        let jti = generate_identifier();
        let refresh = self.codec.sign_refresh(user_id, &jti)?;

        self.sessions
            .create(NewSession {
                jti_hash: hash_identifier(&jti),
                user_id,
                issued_at: refresh.issued_at,
                expires_at: refresh.expires_at,
                provenance: provenance.clone(),
            })
            .await?;

        let access = self.codec.sign_access(user_id, role)?;

        tracing::info!(user_id = %user_id, "Issued new refresh session");
        Ok(self.pair(access.token, refresh.token))
    }

    /// Exchange a refresh token for a new pair, consuming the old session.
    pub async fn refresh(
        &self,
        raw_refresh_token: &str,
        provenance: &Provenance,
    ) -> Result<TokenPair, RotationError> {
        // Clock and signature checks happen before any storage access.
        let claims = self
            .codec
            .verify_refresh(raw_refresh_token)
            .map_err(|e| {
                match e {
                    TokenError::Expired => tracing::debug!("Refresh token expired"),
                    _ => tracing::warn!(error = %e, "Refresh token rejected"),
                }
                e
            })?;
        let user_id = claims.user_id()?;
        let old_hash = hash_identifier(&claims.jti);

        let session = match self.sessions.find_by_identifier_hash(&old_hash).await? {
            Some(session) => session,
            None => {
                tracing::warn!(user_id = %user_id, "Refresh token references unknown session");
                return Err(RotationError::Invalid);
            }
        };

        if session.user_id != user_id {
            tracing::warn!(
                user_id = %user_id,
                owner_id = %session.user_id,
                "Refresh token subject does not match session owner"
            );
            return Err(RotationError::Invalid);
        }

        if session.is_revoked() {
            return self.replay_detected(session.user_id).await;
        }

        if session.is_expired_at(Utc::now()) {
            return Err(RotationError::Expired);
        }

        // The role may have changed since the last issuance, so it is re-read
        // rather than carried in the refresh token. Everything fallible runs
        // before `rotate`, so a failure here leaves the presented token usable.
        let user = match self.credentials.find_user_by_id(user_id).await? {
            Some(user) => user,
            None => {
                self.cascade
                    .revoke_all(user_id, RevocationReason::AccountMissing)
                    .await?;
                return Err(RotationError::Invalid);
            }
        };

        let jti = generate_identifier();
        let refresh = self.codec.sign_refresh(user_id, &jti)?;
        let access = self.codec.sign_access(user.id, &user.role)?;
        let successor = NewSession {
            jti_hash: hash_identifier(&jti),
            user_id,
            issued_at: refresh.issued_at,
            expires_at: refresh.expires_at,
            provenance: provenance.clone(),
        };

        if !self.sessions.rotate(&old_hash, successor).await? {
            tracing::debug!(user_id = %user_id, "Lost rotation race for refresh session");
            return self.replay_detected(user_id).await;
        }

        tracing::debug!(user_id = %user_id, "Rotated refresh session");
        Ok(self.pair(access.token, refresh.token))
    }

    /// Best-effort logout of the session behind `raw_refresh_token`.
    ///
    /// Never fails: a garbage token, an unknown session or a storage error are
    /// all reported through the outcome and otherwise ignored.
    pub async fn revoke_one(&self, raw_refresh_token: &str) -> RevokeOutcome {
        let claims = match self.codec.verify_refresh(raw_refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unverifiable token on logout");
                return RevokeOutcome::Unverifiable;
            }
        };

        let jti_hash = hash_identifier(&claims.jti);
        let found = match self.sessions.find_by_identifier_hash(&jti_hash).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up session on logout");
                return RevokeOutcome::Failed;
            }
        };
        if found.is_none() {
            return RevokeOutcome::SessionNotFound;
        }

        match self.sessions.revoke_by_identifier_hash(&jti_hash).await {
            Ok(true) => {
                tracing::info!(user_id = %claims.sub, "Refresh session revoked on logout");
                RevokeOutcome::Revoked
            }
            Ok(false) => RevokeOutcome::AlreadyRevoked,
            Err(e) => {
                tracing::error!(error = %e, "Failed to revoke session on logout");
                RevokeOutcome::Failed
            }
        }
    }

    /// Revoke every active session of `user_id`.
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, RotationError> {
        Ok(self.cascade.revoke_all(user_id, reason).await?)
    }

    async fn replay_detected(&self, user_id: Uuid) -> Result<TokenPair, RotationError> {
        self.cascade
            .revoke_all(user_id, RevocationReason::ReplayDetected)
            .await?;
        Err(RotationError::ReplayDetected)
    }

    fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.access_ttl().num_seconds(),
            refresh_expires_in: self.codec.refresh_ttl().num_seconds(),
        }
    }
}
