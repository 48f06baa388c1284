//! In-process session store.
//!
//! Backs tests and local development. A single mutex guards the whole table,
//! so every conditional update is trivially a compare-and-set.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{NewSession, RefreshSession, SessionRecordStore};
use crate::error::DatabaseError;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, RefreshSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        sessions: &mut HashMap<String, RefreshSession>,
        session: NewSession,
    ) -> Result<Uuid, DatabaseError> {
        if sessions.contains_key(&session.jti_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_sessions.jti_hash".to_string(),
            ));
        }
        let record = session.into_record();
        let id = record.id;
        sessions.insert(record.jti_hash.clone(), record);
        Ok(id)
    }
}

#[async_trait]
impl SessionRecordStore for InMemorySessionStore {
    async fn create(&self, session: NewSession) -> Result<Uuid, DatabaseError> {
        let mut sessions = self.sessions.lock().await;
        Self::insert(&mut sessions, session)
    }

    async fn find_by_identifier_hash(
        &self,
        jti_hash: &str,
    ) -> Result<Option<RefreshSession>, DatabaseError> {
        Ok(self.sessions.lock().await.get(jti_hash).cloned())
    }

    async fn mark_revoked_and_chain(
        &self,
        jti_hash: &str,
        successor_hash: &str,
    ) -> Result<bool, DatabaseError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(jti_hash) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(Utc::now());
                session.replaced_by_hash = Some(successor_hash.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_active_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let mut count = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id && session.is_active_at(now) {
                session.revoked_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn revoke_by_identifier_hash(&self, jti_hash: &str) -> Result<bool, DatabaseError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(jti_hash) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>, DatabaseError> {
        let sessions = self.sessions.lock().await;
        let mut rows: Vec<RefreshSession> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(rows)
    }

    async fn rotate(&self, old_hash: &str, successor: NewSession) -> Result<bool, DatabaseError> {
        let mut sessions = self.sessions.lock().await;

        let still_active = sessions
            .get(old_hash)
            .map(|s| s.revoked_at.is_none())
            .unwrap_or(false);
        if !still_active {
            return Ok(false);
        }

        let successor_hash = successor.jti_hash.clone();
        Self::insert(&mut sessions, successor)?;

        if let Some(old) = sessions.get_mut(old_hash) {
            old.revoked_at = Some(Utc::now());
            old.replaced_by_hash = Some(successor_hash);
        }
        Ok(true)
    }
}
