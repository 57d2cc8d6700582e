//! Lookups and response assembly shared by the handler modules.

use crate::error::AppError;
use crate::models::*;
use crate::schema::*;
use diesel::dsl::count_star;
use diesel::prelude::*;
use std::collections::{HashMap, HashSet};

pub fn find_user(conn: &mut PgConnection, user_id: &str) -> Result<User, AppError> {
    users::table
        .filter(users::id.eq(user_id))
        .first(conn)
        .map_err(AppError::from_diesel)
}

pub fn find_tweet(conn: &mut PgConnection, tweet_id: &str) -> Result<Tweet, AppError> {
    tweets::table
        .filter(tweets::id.eq(tweet_id))
        .first(conn)
        .map_err(AppError::from_diesel)
}

/// Resolves a pagination cursor. An unknown id is the caller's mistake, not a missing resource.
pub fn cursor_oid<F>(cursor: Option<&str>, resolve: F) -> Result<Option<i64>, AppError>
where
    F: FnOnce(&str) -> QueryResult<i64>,
{
    match cursor {
        None => Ok(None),
        Some(id) => match resolve(id) {
            Ok(oid) => Ok(Some(oid)),
            Err(diesel::result::Error::NotFound) => {
                Err(AppError::BadRequest(format!("Invalid cursor: {}", id)))
            }
            Err(e) => Err(AppError::from_diesel(e)),
        },
    }
}

pub fn profile(
    conn: &mut PgConnection,
    user: &User,
    include_email: bool,
) -> Result<ProfileResponse, AppError> {
    let followers_count: i64 = follows::table
        .filter(follows::followed_oid.eq(user.oid))
        .count()
        .get_result(conn)
        .map_err(AppError::from_diesel)?;

    let following_count: i64 = follows::table
        .filter(follows::follower_oid.eq(user.oid))
        .count()
        .get_result(conn)
        .map_err(AppError::from_diesel)?;

    let tweets_count: i64 = tweets::table
        .filter(tweets::user_oid.eq(user.oid))
        .count()
        .get_result(conn)
        .map_err(AppError::from_diesel)?;

    Ok(ProfileResponse {
        user: UserResponse::from_user(user, include_email),
        followers_count,
        following_count,
        tweets_count,
    })
}

/// Builds responses for a page of tweets with three grouped queries instead of one round trip
/// per tweet.
pub fn tweet_responses(
    conn: &mut PgConnection,
    rows: Vec<(Tweet, User)>,
    viewer_oid: Option<i64>,
) -> Result<Vec<TweetResponse>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let oids: Vec<i64> = rows.iter().map(|(t, _)| t.oid).collect();

    let like_counts: HashMap<i64, i64> = likes::table
        .filter(likes::tweet_oid.eq_any(&oids))
        .group_by(likes::tweet_oid)
        .select((likes::tweet_oid, count_star()))
        .load::<(i64, i64)>(conn)
        .map_err(AppError::from_diesel)?
        .into_iter()
        .collect();

    let comment_counts: HashMap<i64, i64> = comments::table
        .filter(comments::tweet_oid.eq_any(&oids))
        .group_by(comments::tweet_oid)
        .select((comments::tweet_oid, count_star()))
        .load::<(i64, i64)>(conn)
        .map_err(AppError::from_diesel)?
        .into_iter()
        .collect();

    let liked: Option<HashSet<i64>> = match viewer_oid {
        Some(viewer) => Some(
            likes::table
                .filter(likes::user_oid.eq(viewer))
                .filter(likes::tweet_oid.eq_any(&oids))
                .select(likes::tweet_oid)
                .load::<i64>(conn)
                .map_err(AppError::from_diesel)?
                .into_iter()
                .collect(),
        ),
        None => None,
    };

    Ok(rows
        .into_iter()
        .map(|(tweet, author)| TweetResponse {
            likes_count: like_counts.get(&tweet.oid).copied().unwrap_or(0),
            comments_count: comment_counts.get(&tweet.oid).copied().unwrap_or(0),
            liked_by_me: liked.as_ref().map(|set| set.contains(&tweet.oid)),
            id: tweet.id,
            object: "tweet".to_string(),
            image_url: tweet.image_url,
            text: tweet.text,
            created_at: tweet.created_at.and_utc().timestamp(),
            author: AuthorResponse::from(&author),
        })
        .collect())
}

pub fn tweet_response(
    conn: &mut PgConnection,
    tweet: Tweet,
    author: User,
    viewer_oid: Option<i64>,
) -> Result<TweetResponse, AppError> {
    tweet_responses(conn, vec![(tweet, author)], viewer_oid)?
        .pop()
        .ok_or(AppError::InternalError)
}

pub fn comment_response(comment: Comment, tweet_id: String, author: &User) -> CommentResponse {
    CommentResponse {
        id: comment.id,
        object: "comment".to_string(),
        tweet_id,
        text: comment.text,
        created_at: comment.created_at.and_utc().timestamp(),
        author: AuthorResponse::from(author),
    }
}
