#[cfg(test)]
pub mod memory;

use std::{fmt, str::FromStr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{Error, Result};

const BCRYPT_COST: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(Error::invalid(format!("unknown role: {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fails with `Conflict` when the username or email is taken.
    async fn insert(&self, user: &NewUser) -> Result<i64>;
}

/// Login and admin registration. Everything else about accounts is handled
/// outside this service.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Returns the active user matching `email` and `password`.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let rejected = || Error::Unauthorized("invalid email or password".into());

        let user = self.store.find_by_email(email).await?.ok_or_else(rejected)?;
        if !verify_password(password, &user.password_hash).await? {
            return Err(rejected());
        }
        if !user.is_active {
            return Err(Error::Forbidden("account is disabled".into()));
        }
        Ok(user)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<i64> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(Error::invalid("name, email and password are required"));
        }
        if !email.contains('@') {
            return Err(Error::invalid(format!("invalid email: {email:?}")));
        }

        let password_hash = hash_password(password).await?;
        let id = self
            .store
            .insert(&NewUser {
                username: username.to_owned(),
                email: email.to_owned(),
                password_hash,
                role,
            })
            .await?;

        info!(user_id = id, username = %username, role = %role, "User registered");
        Ok(id)
    }
}

async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")?;
    Ok(hash)
}

async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let (password, hash) = (password.to_owned(), hash.to_owned());
    let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("password verification task failed")?
        // A malformed stored hash can never match.
        .unwrap_or(false);
    Ok(ok)
}
