use crate::app_state::AppState;
use crate::{handlers_auth, handlers_interactions, handlers_tweets, handlers_users};
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Headroom on top of the image itself for the other multipart fields and boundaries.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
        .allow_origin(Any);

    let body_limit = state.config.max_image_size_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(handlers_auth::register))
        .route("/auth/login", post(handlers_auth::login))
        .route("/auth/me", get(handlers_auth::me))
        .route("/feed", get(handlers_tweets::feed))
        .route(
            "/tweets",
            get(handlers_tweets::list_tweets).post(handlers_tweets::create_tweet),
        )
        .route("/tweets/search", get(handlers_tweets::search_tweets))
        .route(
            "/tweets/:tweet_id",
            get(handlers_tweets::get_tweet).delete(handlers_tweets::delete_tweet),
        )
        .route(
            "/tweets/:tweet_id/likes",
            get(handlers_interactions::list_likes)
                .post(handlers_interactions::like_tweet)
                .delete(handlers_interactions::unlike_tweet),
        )
        .route(
            "/tweets/:tweet_id/comments",
            get(handlers_interactions::list_comments).post(handlers_interactions::create_comment),
        )
        .route(
            "/comments/:comment_id",
            axum::routing::delete(handlers_interactions::delete_comment),
        )
        .route("/users", get(handlers_users::search_users))
        .route(
            "/users/me",
            get(handlers_auth::me).patch(handlers_users::update_me),
        )
        .route("/users/me/avatar", put(handlers_users::upload_avatar))
        .route(
            "/users/by-username/:username",
            get(handlers_users::get_user_by_username),
        )
        .route("/users/:user_id", get(handlers_users::get_user))
        .route("/users/:user_id/tweets", get(handlers_users::user_tweets))
        .route(
            "/users/:user_id/followers",
            get(handlers_users::list_followers),
        )
        .route(
            "/users/:user_id/following",
            get(handlers_users::list_following),
        )
        .route(
            "/users/:user_id/follow",
            post(handlers_interactions::follow_user).delete(handlers_interactions::unfollow_user),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
