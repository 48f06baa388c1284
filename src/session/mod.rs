//! Refresh session records and the store interface the rotation engine consumes.
//!
//! A session row is keyed by the SHA-256 hash of its identifier. Rows are
//! never deleted here; they die by having `revoked_at` set, and a rotated row
//! additionally points at its successor through `replaced_by_hash`.

mod memory;
mod postgres;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Advisory request metadata recorded with a session
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One persisted refresh session
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshSession {
    pub id: Uuid,
    pub jti_hash: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_hash: Option<String>,
    pub created_by_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Lifecycle state of a session at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Revoked because it was rotated forward
    Rotated,
    /// Revoked by logout, replay response, or an administrator
    Revoked,
    /// Never revoked, but past `expires_at`
    Expired,
}

impl RefreshSession {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        match (&self.revoked_at, &self.replaced_by_hash) {
            (Some(_), Some(_)) => SessionState::Rotated,
            (Some(_), None) => SessionState::Revoked,
            (None, _) if self.is_expired_at(now) => SessionState::Expired,
            (None, _) => SessionState::Active,
        }
    }
}

/// Data needed to persist a fresh session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub jti_hash: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl NewSession {
    pub(crate) fn into_record(self) -> RefreshSession {
        RefreshSession {
            id: Uuid::new_v4(),
            jti_hash: self.jti_hash,
            user_id: self.user_id,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            revoked_at: None,
            replaced_by_hash: None,
            created_by_ip: self.provenance.ip,
            user_agent: self.provenance.user_agent,
        }
    }
}

/// Persistence for refresh sessions.
///
/// The store is the only shared mutable state of the subsystem. Conditional
/// updates (`mark_revoked_and_chain`, `revoke_by_identifier_hash`, `rotate`)
/// must be atomic across processes: a single conditional statement or an
/// equivalent compare-and-set, never an in-process lock alone.
#[async_trait]
pub trait SessionRecordStore: Send + Sync {
    /// Persist a new active session and return its id.
    async fn create(&self, session: NewSession) -> Result<Uuid, DatabaseError>;

    async fn find_by_identifier_hash(
        &self,
        jti_hash: &str,
    ) -> Result<Option<RefreshSession>, DatabaseError>;

    /// Set `revoked_at = now` and `replaced_by_hash = successor_hash` on the row
    /// for `jti_hash`, only if it is not revoked yet.
    ///
    /// Returns `true` when this caller won the update, `false` when the row was
    /// already revoked (or does not exist).
    async fn mark_revoked_and_chain(
        &self,
        jti_hash: &str,
        successor_hash: &str,
    ) -> Result<bool, DatabaseError>;

    /// Revoke every active session of `user_id`; returns how many rows changed.
    async fn revoke_all_active_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError>;

    /// Revoke a single session without chaining it. `false` if it was already revoked.
    async fn revoke_by_identifier_hash(&self, jti_hash: &str) -> Result<bool, DatabaseError>;

    /// All sessions of a user in any state, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>, DatabaseError>;

    /// Create `successor` and chain `old_hash` to it.
    ///
    /// Returns `false` if another caller rotated or revoked `old_hash` first.
    /// The default composes `create` and `mark_revoked_and_chain`, which leaves
    /// the successor row behind on a lost race; stores that can do both in one
    /// transaction should override it so a loser persists nothing.
    async fn rotate(&self, old_hash: &str, successor: NewSession) -> Result<bool, DatabaseError> {
        let successor_hash = successor.jti_hash.clone();
        self.create(successor).await?;
        self.mark_revoked_and_chain(old_hash, &successor_hash).await
    }
}
