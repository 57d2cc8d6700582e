pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers_auth;
pub mod handlers_interactions;
pub mod handlers_tweets;
pub mod handlers_users;
pub mod media;
pub mod models;
pub mod pagination;
pub mod queries;
pub mod routes;
pub mod schema;
pub mod snowflake;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;
