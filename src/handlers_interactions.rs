use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::*;
use crate::pagination::{Bound, PageParams, SortOrder};
use crate::queries;
use crate::schema::*;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use std::collections::HashMap;
use validator::Validate;

pub async fn like_tweet(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(tweet_id): Path<String>,
) -> Result<(StatusCode, Json<LikeResponse>), AppError> {
    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;
    let tweet = queries::find_tweet(&mut conn, &tweet_id)?;

    let existing: Option<Like> = likes::table
        .filter(likes::user_oid.eq(me.oid))
        .filter(likes::tweet_oid.eq(tweet.oid))
        .first(&mut conn)
        .optional()
        .map_err(AppError::from_diesel)?;

    if existing.is_some() {
        return Err(AppError::Conflict("Tweet already liked".to_string()));
    }

    let (oid, id) = state.ids.next("like")?;
    let like: Like = diesel::insert_into(likes::table)
        .values(&NewLike {
            oid,
            id,
            user_oid: me.oid,
            tweet_oid: tweet.oid,
        })
        .get_result(&mut conn)
        .map_err(AppError::from_diesel)?;

    Ok((
        StatusCode::CREATED,
        Json(LikeResponse {
            id: like.id,
            object: "like".to_string(),
            tweet_id: tweet.id,
            user_id: me.id,
            created_at: like.created_at.and_utc().timestamp(),
        }),
    ))
}

pub async fn unlike_tweet(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(tweet_id): Path<String>,
) -> Result<Json<LikeResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;
    let tweet = queries::find_tweet(&mut conn, &tweet_id)?;

    let like: Like = likes::table
        .filter(likes::user_oid.eq(me.oid))
        .filter(likes::tweet_oid.eq(tweet.oid))
        .first(&mut conn)
        .map_err(AppError::from_diesel)?;

    // Also clears duplicates, since the table does not prevent them.
    diesel::delete(
        likes::table
            .filter(likes::user_oid.eq(me.oid))
            .filter(likes::tweet_oid.eq(tweet.oid)),
    )
    .execute(&mut conn)
    .map_err(AppError::from_diesel)?;

    Ok(Json(LikeResponse {
        id: like.id,
        object: "like".to_string(),
        tweet_id: tweet.id,
        user_id: me.id,
        created_at: like.created_at.and_utc().timestamp(),
    }))
}

pub async fn list_likes(
    State(state): State<AppState>,
    Path(tweet_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<UserResponse>>, AppError> {
    let page = PageParams::from_query(query, SortOrder::Desc)?;

    let mut conn = state.db_pool.get()?;
    let tweet = queries::find_tweet(&mut conn, &tweet_id)?;

    let cursor = queries::cursor_oid(page.cursor(), |id| {
        likes::table
            .inner_join(users::table)
            .filter(likes::tweet_oid.eq(tweet.oid))
            .filter(users::id.eq(id))
            .select(likes::oid)
            .first(&mut conn)
    })?;

    let mut base_query = likes::table
        .filter(likes::tweet_oid.eq(tweet.oid))
        .into_boxed();

    match page.bound(cursor) {
        Some(Bound::Gt(oid)) => base_query = base_query.filter(likes::oid.gt(oid)),
        Some(Bound::Lt(oid)) => base_query = base_query.filter(likes::oid.lt(oid)),
        None => {}
    }

    base_query = match page.query_order() {
        SortOrder::Asc => base_query.order(likes::oid.asc()),
        SortOrder::Desc => base_query.order(likes::oid.desc()),
    };

    let rows: Vec<Like> = base_query
        .limit(page.fetch_limit())
        .load(&mut conn)
        .map_err(AppError::from_diesel)?;

    let user_oids: Vec<i64> = rows.iter().map(|l| l.user_oid).collect();
    let likers: HashMap<i64, User> = users::table
        .filter(users::oid.eq_any(&user_oids))
        .load::<User>(&mut conn)
        .map_err(AppError::from_diesel)?
        .into_iter()
        .map(|u| (u.oid, u))
        .collect();

    Ok(Json(page.respond(rows, |like| {
        likers
            .get(&like.user_oid)
            .map(|u| UserResponse::from_user(u, false))
            .ok_or(AppError::DatabaseError)
    })?))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(tweet_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<CommentResponse>>, AppError> {
    let page = PageParams::from_query(query, SortOrder::Asc)?;

    let mut conn = state.db_pool.get()?;
    let tweet = queries::find_tweet(&mut conn, &tweet_id)?;

    let cursor = queries::cursor_oid(page.cursor(), |id| {
        comments::table
            .filter(comments::id.eq(id))
            .filter(comments::tweet_oid.eq(tweet.oid))
            .select(comments::oid)
            .first(&mut conn)
    })?;

    let mut base_query = comments::table
        .inner_join(users::table)
        .filter(comments::tweet_oid.eq(tweet.oid))
        .select((Comment::as_select(), User::as_select()))
        .into_boxed();

    match page.bound(cursor) {
        Some(Bound::Gt(oid)) => base_query = base_query.filter(comments::oid.gt(oid)),
        Some(Bound::Lt(oid)) => base_query = base_query.filter(comments::oid.lt(oid)),
        None => {}
    }

    base_query = match page.query_order() {
        SortOrder::Asc => base_query.order(comments::oid.asc()),
        SortOrder::Desc => base_query.order(comments::oid.desc()),
    };

    let rows: Vec<(Comment, User)> = base_query
        .limit(page.fetch_limit())
        .load(&mut conn)
        .map_err(AppError::from_diesel)?;

    Ok(Json(page.respond(rows, |(comment, author)| {
        Ok(queries::comment_response(
            comment,
            tweet.id.clone(),
            &author,
        ))
    })?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(tweet_id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    payload.validate()?;

    let text = payload.text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::BadRequest("Comment text is empty".to_string()));
    }

    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;
    let tweet = queries::find_tweet(&mut conn, &tweet_id)?;

    let (oid, id) = state.ids.next("comment")?;
    let comment: Comment = diesel::insert_into(comments::table)
        .values(&NewComment {
            oid,
            id,
            user_oid: me.oid,
            tweet_oid: tweet.oid,
            text,
        })
        .get_result(&mut conn)
        .map_err(AppError::from_diesel)?;

    Ok((
        StatusCode::CREATED,
        Json(queries::comment_response(comment, tweet.id, &me)),
    ))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(comment_id): Path<String>,
) -> Result<Json<CommentResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;

    let (comment, tweet): (Comment, Tweet) = comments::table
        .inner_join(tweets::table)
        .filter(comments::id.eq(&comment_id))
        .select((Comment::as_select(), Tweet::as_select()))
        .first(&mut conn)
        .map_err(AppError::from_diesel)?;

    // Authors may remove their own comments; tweet owners may moderate theirs.
    if comment.user_oid != me.oid && tweet.user_oid != me.oid {
        return Err(AppError::Forbidden);
    }

    let author: User = users::table
        .find(comment.user_oid)
        .first(&mut conn)
        .map_err(AppError::from_diesel)?;

    diesel::delete(comments::table.find(comment.oid))
        .execute(&mut conn)
        .map_err(AppError::from_diesel)?;

    Ok(Json(queries::comment_response(comment, tweet.id, &author)))
}

pub async fn follow_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<FollowResponse>), AppError> {
    if caller.user_id == user_id {
        return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
    }

    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;
    let target = queries::find_user(&mut conn, &user_id)?;

    let existing: Option<Follow> = follows::table
        .filter(follows::follower_oid.eq(me.oid))
        .filter(follows::followed_oid.eq(target.oid))
        .first(&mut conn)
        .optional()
        .map_err(AppError::from_diesel)?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Already following {}",
            target.username
        )));
    }

    let (oid, id) = state.ids.next("follow")?;
    let follow: Follow = diesel::insert_into(follows::table)
        .values(&NewFollow {
            oid,
            id,
            follower_oid: me.oid,
            followed_oid: target.oid,
        })
        .get_result(&mut conn)
        .map_err(AppError::from_diesel)?;

    tracing::info!("User {} followed {}", me.id, target.id);

    Ok((
        StatusCode::CREATED,
        Json(FollowResponse {
            id: follow.id,
            object: "follow".to_string(),
            follower_id: me.id,
            followed_id: target.id,
            created_at: follow.created_at.and_utc().timestamp(),
        }),
    ))
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<FollowResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;
    let target = queries::find_user(&mut conn, &user_id)?;

    let follow: Follow = follows::table
        .filter(follows::follower_oid.eq(me.oid))
        .filter(follows::followed_oid.eq(target.oid))
        .first(&mut conn)
        .map_err(AppError::from_diesel)?;

    diesel::delete(follows::table.find(follow.oid))
        .execute(&mut conn)
        .map_err(AppError::from_diesel)?;

    tracing::info!("User {} unfollowed {}", me.id, target.id);

    Ok(Json(FollowResponse {
        id: follow.id,
        object: "follow".to_string(),
        follower_id: me.id,
        followed_id: target.id,
        created_at: follow.created_at.and_utc().timestamp(),
    }))
}
