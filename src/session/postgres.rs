//! PostgreSQL-backed session store.
//!
//! The serialization point for concurrent rotation is the conditional
//! `UPDATE ... WHERE jti_hash = $n AND revoked_at IS NULL`: under READ
//! COMMITTED the second writer blocks on the row lock, re-evaluates the
//! predicate after the first commits, and updates zero rows.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{NewSession, RefreshSession, SessionRecordStore};
use crate::error::DatabaseError;

const SESSION_COLUMNS: &str = "id, jti_hash, user_id, issued_at, expires_at, revoked_at, \
     replaced_by_hash, created_by_ip, user_agent";

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRecordStore for PgSessionStore {
    async fn create(&self, session: NewSession) -> Result<Uuid, DatabaseError> {
        let record = session.into_record();

        sqlx::query(
            r#"
            INSERT INTO refresh_sessions
                (id, jti_hash, user_id, issued_at, expires_at, created_by_ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.jti_hash)
        .bind(record.user_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(&record.created_by_ip)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(record.id)
    }

    async fn find_by_identifier_hash(
        &self,
        jti_hash: &str,
    ) -> Result<Option<RefreshSession>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM refresh_sessions WHERE jti_hash = $1",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, RefreshSession>(&query)
            .bind(jti_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn mark_revoked_and_chain(
        &self,
        jti_hash: &str,
        successor_hash: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked_at = $1, replaced_by_hash = $2
            WHERE jti_hash = $3 AND revoked_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(successor_hash)
        .bind(jti_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_active_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked_at = $1
            WHERE user_id = $2 AND revoked_at IS NULL AND expires_at > $1
            "#,
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke_by_identifier_hash(&self, jti_hash: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked_at = $1
            WHERE jti_hash = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(jti_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM refresh_sessions WHERE user_id = $1 ORDER BY issued_at DESC",
            SESSION_COLUMNS
        );
        let sessions = sqlx::query_as::<_, RefreshSession>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sessions)
    }

    async fn rotate(&self, old_hash: &str, successor: NewSession) -> Result<bool, DatabaseError> {
        let record = successor.into_record();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO refresh_sessions
                (id, jti_hash, user_id, issued_at, expires_at, created_by_ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.jti_hash)
        .bind(record.user_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(&record.created_by_ip)
        .bind(&record.user_agent)
        .execute(&mut tx)
        .await?;

        let chained = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked_at = $1, replaced_by_hash = $2
            WHERE jti_hash = $3 AND revoked_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(&record.jti_hash)
        .bind(old_hash)
        .execute(&mut tx)
        .await?;

        if chained.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }
}
