use async_trait::async_trait;
use sqlx::MySqlPool;

use super::models::UserRow;
use crate::{
    error::{Error, Result},
    users::{NewUser, User, UserStore},
};

#[derive(Debug, Clone)]
pub struct MySqlUserStore {
    pool: MySqlPool,
}

impl MySqlUserStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for MySqlUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, role, is_active, created_at \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn insert(&self, user: &NewUser) -> Result<i64> {
        let done = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, is_active) \
             VALUES (?, ?, ?, ?, 1)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::conflict("username or email already registered"),
            other => other,
        })?;

        Ok(done.last_insert_id() as i64)
    }
}
