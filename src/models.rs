use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
#[diesel(primary_key(oid))]
pub struct User {
    pub oid: i64,
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub avatar_key: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub oid: i64,
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = crate::schema::users)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub bio: Option<Option<String>>,
    pub avatar: Option<String>,
    pub avatar_key: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Queryable, QueryableByName, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = crate::schema::tweets)]
#[diesel(belongs_to(User, foreign_key = user_oid))]
#[diesel(primary_key(oid))]
pub struct Tweet {
    pub oid: i64,
    pub id: String,
    pub user_oid: i64,
    pub image_url: String,
    pub image_key: String,
    pub text: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::tweets)]
pub struct NewTweet {
    pub oid: i64,
    pub id: String,
    pub user_oid: i64,
    pub image_url: String,
    pub image_key: String,
    pub text: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = crate::schema::comments)]
#[diesel(belongs_to(User, foreign_key = user_oid))]
#[diesel(belongs_to(Tweet, foreign_key = tweet_oid))]
#[diesel(primary_key(oid))]
pub struct Comment {
    pub oid: i64,
    pub id: String,
    pub user_oid: i64,
    pub tweet_oid: i64,
    pub text: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::comments)]
pub struct NewComment {
    pub oid: i64,
    pub id: String,
    pub user_oid: i64,
    pub tweet_oid: i64,
    pub text: String,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = crate::schema::likes)]
#[diesel(belongs_to(User, foreign_key = user_oid))]
#[diesel(belongs_to(Tweet, foreign_key = tweet_oid))]
#[diesel(primary_key(oid))]
pub struct Like {
    pub oid: i64,
    pub id: String,
    pub user_oid: i64,
    pub tweet_oid: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::likes)]
pub struct NewLike {
    pub oid: i64,
    pub id: String,
    pub user_oid: i64,
    pub tweet_oid: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::follows)]
#[diesel(primary_key(oid))]
pub struct Follow {
    pub oid: i64,
    pub id: String,
    pub follower_oid: i64,
    pub followed_oid: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::follows)]
pub struct NewFollow {
    pub oid: i64,
    pub id: String,
    pub follower_oid: i64,
    pub followed_oid: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub object: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: i64,
}

impl UserResponse {
    /// Public view of a user. Email is only shown to the account owner.
    pub fn from_user(user: &User, include_email: bool) -> Self {
        Self {
            id: user.id.clone(),
            object: "user".to_string(),
            username: user.username.clone(),
            email: include_email.then(|| user.email.clone()),
            bio: user.bio.clone(),
            avatar: user.avatar.clone(),
            created_at: user.created_at.and_utc().timestamp(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub followers_count: i64,
    pub following_count: i64,
    pub tweets_count: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthorResponse {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
}

impl From<&User> for AuthorResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TweetResponse {
    pub id: String,
    pub object: String,
    pub image_url: String,
    pub text: Option<String>,
    pub created_at: i64,
    pub author: AuthorResponse,
    pub likes_count: i64,
    pub comments_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_by_me: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CommentResponse {
    pub id: String,
    pub object: String,
    pub tweet_id: String,
    pub text: String,
    pub created_at: i64,
    pub author: AuthorResponse,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LikeResponse {
    pub id: String,
    pub object: String,
    pub tweet_id: String,
    pub user_id: String,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FollowResponse {
    pub id: String,
    pub object: String,
    pub follower_id: String,
    pub followed_id: String,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub pagination: PaginationResponse,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PaginationResponse {
    pub has_more_before: bool,
    pub has_more_after: bool,
}

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub login: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: Option<String>,
    #[validate(length(max = 160, message = "must be at most 160 characters"))]
    pub bio: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 500, message = "must be between 1 and 500 characters"))]
    pub text: String,
}

#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub order: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

pub const MAX_TWEET_TEXT_CHARS: usize = 280;

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return Err(ValidationError::new("length")
            .with_message("must be between 3 and 30 characters".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::new("charset")
            .with_message("may only contain letters, digits and underscores".into()));
    }
    Ok(())
}
