use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::instrument;
use uuid::Uuid;

use super::{DuplicateEmail, UserStore};
use crate::models::user::UserModel;

#[derive(Clone, Debug)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

impl UserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    #[instrument(name = "Saving new user to database", skip(self, password_hash))]
    async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                anyhow::Error::new(DuplicateEmail)
            }
            _ => {
                tracing::error!("Failed to execute query: {:?}", e);
                e.into()
            }
        })?;
        Ok(id)
    }

    #[instrument(name = "Fetching user by email from database", skip(self))]
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserModel>> {
        let user = sqlx::query_as::<_, UserModel>(
            r#"SELECT id, email, name, password_hash, created_at FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch user: {:?}", e);
            e
        })?;
        Ok(user)
    }
}
