use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A username or email UNIQUE constraint was violated.
    #[error("user already exists")]
    Duplicate,

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Duplicate,
            _ => RepoError::Database(e),
        }
    }
}

/// Persistence of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// First user whose username equals `username` or whose email equals `email`.
    /// A `None` side never matches.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;

    /// Insert a user. Fails with [`RepoError::Duplicate`] on a username or email clash.
    async fn create(&self, user: NewUser) -> Result<User, RepoError>;

    /// Overwrite the single refresh-token slot. Returns `false` if no such user.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, RepoError>;
}

const USER_COLUMNS: &str = "id, username, email, password_hash, profile_photo, cover_photo, \
                            refresh_token, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, RepoError> {
        // `col = NULL` is never true, so an absent side drops out of the OR.
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, RepoError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, profile_photo, cover_photo)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.profile_photo)
        .bind(&user.cover_photo)
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $2, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
