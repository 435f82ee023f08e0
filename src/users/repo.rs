use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;

use super::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The username is already taken. The database constraint is the authority.
    #[error("username already exists")]
    UniqueViolation,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence boundary for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Inserts an active user. Fails with `UniqueViolation` on a taken username.
    async fn insert(&self, new_user: NewUser<'_>) -> Result<User, StoreError>;

    /// Replaces the password hash and stamps `updated_at`.
    async fn update_password(
        &self,
        username: &str,
        password_hash: &str,
        updated_at: OffsetDateTime,
    ) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str =
    "id, username, password_hash, chronic_condition, location, is_active, created_at, updated_at";

fn map_insert_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::UniqueViolation,
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, new_user: NewUser<'_>) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash, chronic_condition, location, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new_user.username)
        .bind(new_user.password_hash)
        .bind(new_user.chronic_condition)
        .bind(new_user.location)
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_error)
    }

    async fn update_password(
        &self,
        username: &str,
        password_hash: &str,
        updated_at: OffsetDateTime,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET password_hash = $2, updated_at = $3
             WHERE username = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(password_hash)
        .bind(updated_at)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }
}
