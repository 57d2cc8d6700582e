use crate::app_state::AppState;
use crate::auth::{self, AuthUser};
use crate::error::AppError;
use crate::models::*;
use crate::queries;
use crate::schema::*;
use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid username/email or password";

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.validate()?;

    let password_hash = auth::hash_password(&payload.password)?;
    let (oid, id) = state.ids.next("user")?;

    let mut conn = state.db_pool.get()?;

    let new_user = NewUser {
        oid,
        id,
        username: payload.username,
        email: payload.email.trim().to_lowercase(),
        password_hash,
    };

    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)
        .map_err(AppError::from_diesel)?;

    tracing::info!("Registered user {} ({})", user.username, user.id);

    let token = state.jwt.issue(&user.id, &user.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserResponse::from_user(&user, true),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.validate()?;

    let mut conn = state.db_pool.get()?;

    let login = payload.login.trim();
    let user: Option<User> = users::table
        .filter(
            users::username
                .eq(login)
                .or(users::email.eq(login.to_lowercase())),
        )
        .first(&mut conn)
        .optional()
        .map_err(AppError::from_diesel)?;

    let user = match user {
        Some(user) if auth::verify_password(&payload.password, &user.password_hash) => user,
        _ => {
            tracing::debug!("Rejected login for {}", login);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
    };

    let token = state.jwt.issue(&user.id, &user.username)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse::from_user(&user, true),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let user = caller.load(&mut conn)?;
    Ok(Json(queries::profile(&mut conn, &user, true)?))
}
