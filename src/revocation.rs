//! Bulk revocation of a user's sessions.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::SessionRecordStore;

/// Why every session of a user is being revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    /// User asked to sign out everywhere
    Logout,
    /// A consumed or revoked refresh token was presented again
    ReplayDetected,
    /// The owning account no longer exists
    AccountMissing,
    Administrative,
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RevocationReason::Logout => "logout",
            RevocationReason::ReplayDetected => "replay_detected",
            RevocationReason::AccountMissing => "account_missing",
            RevocationReason::Administrative => "administrative",
        };
        f.write_str(reason)
    }
}

/// Idempotent revoke-all: only still-active rows are touched, so a second call
/// changes nothing and reports zero.
#[derive(Clone)]
pub struct RevocationCascade {
    sessions: Arc<dyn SessionRecordStore>,
}

impl RevocationCascade {
    pub fn new(sessions: Arc<dyn SessionRecordStore>) -> Self {
        Self { sessions }
    }

    /// Revoke all active sessions of `user_id`; returns how many were newly revoked.
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, DatabaseError> {
        let revoked = self.sessions.revoke_all_active_for_user(user_id).await?;

        match reason {
            RevocationReason::ReplayDetected | RevocationReason::AccountMissing => {
                tracing::warn!(
                    user_id = %user_id,
                    reason = %reason,
                    revoked = revoked,
                    "Revoked all refresh sessions for user"
                );
            }
            _ => {
                tracing::info!(
                    user_id = %user_id,
                    reason = %reason,
                    revoked = revoked,
                    "Revoked all refresh sessions for user"
                );
            }
        }

        Ok(revoked)
    }
}
