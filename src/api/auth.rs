//! Request credentials.
//!
//! Operators authenticate with a bearer JWT issued by `/api/login`.
//! Automation may instead send `x-service-api-key`, which maps onto a
//! configured synthetic user. The field device sends `x-api-key`.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::AppError;
use crate::{
    config::AuthConfig,
    error::Error,
    users::Role,
};

pub const DEVICE_KEY_HEADER: &str = "x-api-key";
pub const SERVICE_KEY_HEADER: &str = "x-service-api-key";

const SESSION_TTL_DAYS: i64 = 1;
const REMEMBER_ME_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub exp: i64,
}

pub fn session_ttl(remember_me: bool) -> Duration {
    if remember_me {
        Duration::days(REMEMBER_ME_TTL_DAYS)
    } else {
        Duration::days(SESSION_TTL_DAYS)
    }
}

/// HS256 token for `user_id` expiring `ttl` from now.
pub fn issue_token(
    secret: &str,
    user_id: i64,
    username: &str,
    role: Role,
    ttl: Duration,
) -> Result<String, Error> {
    let claims = Claims {
        user_id,
        username: username.to_owned(),
        role,
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(anyhow::Error::new(e).context("failed to sign token")))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        Error::Unauthorized("invalid or expired token".into())
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    header(headers, AUTHORIZATION.as_str())?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// An operator, either from a bearer token or the service key.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<AuthConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthConfig>::from_ref(state);

        if let Some(token) = bearer(&parts.headers) {
            let claims = verify_token(&auth.jwt_secret, token)?;
            return Ok(Self {
                id: claims.user_id,
                username: claims.username,
                role: claims.role,
            });
        }

        match header(&parts.headers, SERVICE_KEY_HEADER) {
            Some(key) if key == auth.service_api_key => Ok(Self {
                id: auth.service_user_id,
                username: "service".into(),
                role: auth.service_user_role,
            }),
            Some(_) => Err(Error::Unauthorized("invalid service API key".into()).into()),
            None => Err(Error::Unauthorized("missing credentials".into()).into()),
        }
    }
}

/// An [`AuthUser`] with the `admin` role.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(Error::Forbidden("admin role required".into()).into());
        }
        Ok(Self(user))
    }
}

/// The field device, identified by the shared `x-api-key`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceKey;

impl<S> FromRequestParts<S> for DeviceKey
where
    Arc<AuthConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthConfig>::from_ref(state);
        match header(&parts.headers, DEVICE_KEY_HEADER) {
            Some(key) if key == auth.device_api_key => Ok(Self),
            Some(_) => Err(Error::Unauthorized("invalid device API key".into()).into()),
            None => Err(Error::Unauthorized("missing x-api-key header".into()).into()),
        }
    }
}
