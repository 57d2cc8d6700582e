//! Password hashing, token issue/verify, and the request extractors that gate authenticated
//! routes.

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::User;
use crate::schema::users;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use diesel::prelude::*;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Hash a plain password with argon2id into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::error!("password hashing failed: {}", e);
            AppError::InternalError
        })
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Public user id.
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expires_in_secs: i64,
}

impl JwtService {
    pub fn new(secret: &str, expires_in_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            expires_in_secs,
        }
    }

    pub fn issue(&self, user_id: &str, username: &str) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now,
            exp: now + self.expires_in_secs,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("failed to sign token: {}", e);
            AppError::InternalError
        })
    }

    /// Fails when the token is malformed, tampered with, or expired.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
    }
}

/// The caller identified by a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

impl AuthUser {
    /// Loads the caller's row. A token for a deleted account is treated as unauthenticated.
    pub fn load(&self, conn: &mut PgConnection) -> Result<User, AppError> {
        users::table
            .filter(users::id.eq(&self.user_id))
            .first(conn)
            .optional()
            .map_err(AppError::from_diesel)?
            .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<Result<&str, AppError>> {
    let value = parts.headers.get(axum::http::header::AUTHORIZATION)?;
    Some(
        value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Malformed authorization header".to_string())),
    )
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))??;
        state.jwt.verify(token).map(AuthUser::from)
    }
}

/// Like [`AuthUser`], but anonymous requests are allowed. A present but invalid token is still
/// rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => {
                let claims = state.jwt.verify(token?)?;
                Ok(MaybeAuthUser(Some(AuthUser::from(claims))))
            }
        }
    }
}
