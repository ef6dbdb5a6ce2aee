use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewUser, UniqueField, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    Conflict(UniqueField),
    #[error("database error: {0}")]
    Backend(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            if db.is_unique_violation() {
                return Self::Conflict(UniqueField::from_constraint(db.constraint()));
            }
        }
        Self::Backend(err)
    }
}

/// Persistence operations over the `users` table.
///
/// Every mutation touches a single row.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, new: &NewUser) -> Result<Uuid, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Matches `identifier` against the lower-cased email or the exact username.
    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError>;
    /// Fills `api_key` and `image` only where they are still NULL.
    async fn backfill_profile(
        &self,
        id: Uuid,
        api_key: &str,
        image: &str,
    ) -> Result<(), StoreError>;
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;
    /// Replaces the password of the user holding an unexpired `token` and clears
    /// the token in the same statement. Returns the user id, if any matched.
    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError>;
}

const USER_COLUMNS: &str = "id, name, email, username, password_hash, api_key, image, role, \
     plan, plan_status, reset_token, reset_token_expires_at, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause} LIMIT 1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, new: &NewUser) -> Result<Uuid, StoreError> {
        let (id,) = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO users (id, name, email, username, password_hash, api_key, image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(new.id)
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.api_key)
        .bind(&new.image)
        .fetch_one(&self.db)
        .await?;
        Ok(id)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("email = $1", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("username = $1", username).await
    }

    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        // email matches win over username matches
        self.fetch_one_where(
            "email = lower($1) OR username = $1 ORDER BY (email = lower($1)) DESC",
            identifier,
        )
        .await
    }

    async fn backfill_profile(
        &self,
        id: Uuid,
        api_key: &str,
        image: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET api_key = COALESCE(api_key, $2),
                   image = COALESCE(image, $3)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(api_key)
        .bind(image)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET reset_token = $2,
                   reset_token_expires_at = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            UPDATE users
               SET password_hash = $3,
                   reset_token = NULL,
                   reset_token_expires_at = NULL
             WHERE reset_token = $1
               AND reset_token_expires_at > $2
            RETURNING id
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|(id,)| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_map_to_fields() {
        assert_eq!(
            UniqueField::from_constraint(Some("users_api_key_key")),
            UniqueField::ApiKey
        );
        assert_eq!(
            UniqueField::from_constraint(Some("users_email_key")),
            UniqueField::Email
        );
        assert_eq!(
            UniqueField::from_constraint(Some("users_username_key")),
            UniqueField::Username
        );
        assert_eq!(UniqueField::from_constraint(Some("users_pkey")), UniqueField::Other);
        assert_eq!(UniqueField::from_constraint(None), UniqueField::Other);
    }

    #[test]
    fn non_database_errors_are_backend_errors() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
