//! Credential store: the user records this subsystem reads.
//!
//! Rotation only ever calls `find_user_by_id`; the other operations exist for
//! the login and registration handlers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DatabaseError;

pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub password_hash: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// Fails with `UniqueConstraintViolation` if the email is taken.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, DatabaseError>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, role, password_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, role, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, DatabaseError> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role: role.to_string(),
            password_hash: password_hash.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, email, role, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.role)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(user)
    }
}

/// In-process credential store for tests and local development
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a user, as an account deletion elsewhere would.
    pub async fn delete_user(&self, id: Uuid) -> bool {
        self.users.write().await.remove(&id).is_some()
    }

    pub async fn set_role(&self, id: Uuid, role: &str) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.role = role.to_string();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, DatabaseError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "users.email".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role: role.to_string(),
            password_hash: password_hash.to_string(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trip() {
        let store = InMemoryCredentialStore::new();
        let user = store.create_user("a@example.com", "hash", DEFAULT_ROLE).await.unwrap();

        let by_id = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@example.com");
        let by_email = store.find_user_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        assert!(store.set_role(user.id, "admin").await);
        assert_eq!(store.find_user_by_id(user.id).await.unwrap().unwrap().role, "admin");

        assert!(store.delete_user(user.id).await);
        assert!(store.find_user_by_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryCredentialStore::new();
        store.create_user("a@example.com", "hash", DEFAULT_ROLE).await.unwrap();

        let err = store
            .create_user("a@example.com", "hash", DEFAULT_ROLE)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueConstraintViolation(_)));
    }
}
