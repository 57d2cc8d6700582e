use crate::snowflake::SnowflakeError;
use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::json;
use validator::ValidationErrors;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Validation(ValidationErrors),
    Unauthorized(String),
    Forbidden,
    NotFound,
    Conflict(String),
    DatabaseError,
    StorageError(String),
    InternalError,
}

impl AppError {
    /// Maps a Diesel error onto the response it should produce.
    pub fn from_diesel(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AppError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                let message = match info.constraint_name() {
                    Some("users_username_key") => "Username is already taken".to_string(),
                    Some("users_email_key") => "Email is already registered".to_string(),
                    _ => "Resource already exists".to_string(),
                };
                AppError::Conflict(message)
            }
            other => {
                tracing::error!("database error: {}", other);
                AppError::DatabaseError
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        tracing::error!("failed to acquire database connection: {}", err);
        AppError::DatabaseError
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!("object storage error: {}", err);
        AppError::StorageError(err.to_string())
    }
}

impl From<SnowflakeError> for AppError {
    fn from(err: SnowflakeError) -> Self {
        tracing::error!("id generation failed: {}", err);
        AppError::InternalError
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(errors) => {
                let fields: serde_json::Map<String, serde_json::Value> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errs)| {
                        let messages: Vec<String> = errs
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| e.code.to_string())
                            })
                            .collect();
                        (field.to_string(), json!(messages))
                    })
                    .collect();

                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "Validation failed", "fields": fields })),
                )
                    .into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::DatabaseError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::StorageError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
