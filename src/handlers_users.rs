use crate::app_state::AppState;
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::AppError;
use crate::handlers_tweets::{self, TweetScope};
use crate::media;
use crate::models::*;
use crate::pagination::{Bound, PageParams, SortOrder};
use crate::queries;
use crate::schema::*;
use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use std::collections::HashMap;
use validator::Validate;

const USER_SEARCH_LIMIT: i64 = 20;

#[derive(Clone, Copy)]
enum FollowSide {
    /// Users following the subject.
    Followers,
    /// Users the subject follows.
    Following,
}

pub async fn get_user(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let user = queries::find_user(&mut conn, &user_id)?;
    let is_owner = viewer.0.as_ref().is_some_and(|v| v.user_id == user.id);
    Ok(Json(queries::profile(&mut conn, &user, is_owner)?))
}

pub async fn get_user_by_username(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let user: User = users::table
        .filter(users::username.eq(&username))
        .first(&mut conn)
        .map_err(AppError::from_diesel)?;
    let is_owner = viewer.0.as_ref().is_some_and(|v| v.user_id == user.id);
    Ok(Json(queries::profile(&mut conn, &user, is_owner)?))
}

pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ListResponse<UserResponse>>, AppError> {
    let terms = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest("Search query 'q' is required".to_string()))?;
    let limit = query.limit.unwrap_or(USER_SEARCH_LIMIT).clamp(1, USER_SEARCH_LIMIT);
    let pattern = format!("%{}%", escape_like(terms));

    let mut conn = state.db_pool.get()?;

    let mut found: Vec<User> = users::table
        .filter(users::username.ilike(&pattern))
        .order((users::username.asc(), users::oid.asc()))
        .limit(limit + 1)
        .load(&mut conn)
        .map_err(AppError::from_diesel)?;

    let has_more = found.len() as i64 > limit;
    found.truncate(limit as usize);

    Ok(Json(ListResponse {
        items: found
            .iter()
            .map(|u| UserResponse::from_user(u, false))
            .collect(),
        pagination: PaginationResponse {
            has_more_before: false,
            has_more_after: has_more,
        },
    }))
}

pub async fn update_me(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    payload.validate()?;

    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;

    let update = UpdateUser {
        username: payload.username,
        bio: payload
            .bio
            .map(|bio| Some(bio.trim().to_string()).filter(|b| !b.is_empty())),
        updated_at: Some(Utc::now().naive_utc()),
        ..Default::default()
    };

    let updated: User = diesel::update(users::table.find(me.oid))
        .set(&update)
        .get_result(&mut conn)
        .map_err(AppError::from_diesel)?;

    if updated.username != me.username {
        tracing::info!(
            "User {} renamed from {} to {}",
            updated.id,
            me.username,
            updated.username
        );
    }

    Ok(Json(queries::profile(&mut conn, &updated, true)?))
}

pub async fn upload_avatar(
    State(state): State<AppState>,
    caller: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut avatar = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() == Some("avatar") {
            avatar = Some(media::read_image(field, &state.config).await?);
        }
    }

    let avatar = avatar.ok_or_else(|| AppError::BadRequest("Missing avatar".to_string()))?;

    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;

    let (_, object_name) = state.ids.next("avatar")?;
    let avatar_key = avatar.storage_key(&format!("avatars/{}", me.id), &object_name);

    state
        .storage_client
        .upload(&avatar_key, avatar.data, Some(&avatar.content_type))
        .await?;

    let update = UpdateUser {
        avatar: Some(state.storage_client.public_url(&avatar_key)),
        avatar_key: Some(avatar_key.clone()),
        updated_at: Some(Utc::now().naive_utc()),
        ..Default::default()
    };

    let updated: User = match diesel::update(users::table.find(me.oid))
        .set(&update)
        .get_result(&mut conn)
    {
        Ok(user) => user,
        Err(e) => {
            if let Err(cleanup) = state.storage_client.delete(&avatar_key).await {
                tracing::warn!("Failed to remove orphaned avatar {}: {}", avatar_key, cleanup);
            }
            return Err(AppError::from_diesel(e));
        }
    };

    if let Some(old_key) = me.avatar_key {
        if let Err(e) = state.storage_client.delete(&old_key).await {
            tracing::warn!("Failed to remove previous avatar {}: {}", old_key, e);
        }
    }

    Ok(Json(queries::profile(&mut conn, &updated, true)?))
}

pub async fn user_tweets(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<TweetResponse>>, AppError> {
    let mut conn = state.db_pool.get()?;
    let viewer = handlers_tweets::viewer_oid(&mut conn, &viewer)?;
    let user = queries::find_user(&mut conn, &user_id)?;
    Ok(Json(handlers_tweets::tweet_page(
        &mut conn,
        query,
        TweetScope::Author(user.oid),
        viewer,
    )?))
}

pub async fn list_followers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<UserResponse>>, AppError> {
    let mut conn = state.db_pool.get()?;
    let user = queries::find_user(&mut conn, &user_id)?;
    Ok(Json(follow_page(
        &mut conn,
        query,
        user.oid,
        FollowSide::Followers,
    )?))
}

pub async fn list_following(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<UserResponse>>, AppError> {
    let mut conn = state.db_pool.get()?;
    let user = queries::find_user(&mut conn, &user_id)?;
    Ok(Json(follow_page(
        &mut conn,
        query,
        user.oid,
        FollowSide::Following,
    )?))
}

/// Pages through one side of a user's follow graph, newest relationship first. The cursor is the
/// public id of a listed user.
fn follow_page(
    conn: &mut PgConnection,
    query: ListQuery,
    subject_oid: i64,
    side: FollowSide,
) -> Result<ListResponse<UserResponse>, AppError> {
    let page = PageParams::from_query(query, SortOrder::Desc)?;

    let cursor = queries::cursor_oid(page.cursor(), |id| {
        let listed_oid: i64 = users::table
            .filter(users::id.eq(id))
            .select(users::oid)
            .first(conn)?;
        let (follower, followed) = match side {
            FollowSide::Followers => (listed_oid, subject_oid),
            FollowSide::Following => (subject_oid, listed_oid),
        };
        follows::table
            .filter(follows::follower_oid.eq(follower))
            .filter(follows::followed_oid.eq(followed))
            .select(follows::oid)
            .first(conn)
    })?;

    let mut base_query = follows::table.into_boxed();

    base_query = match side {
        FollowSide::Followers => base_query.filter(follows::followed_oid.eq(subject_oid)),
        FollowSide::Following => base_query.filter(follows::follower_oid.eq(subject_oid)),
    };

    match page.bound(cursor) {
        Some(Bound::Gt(oid)) => base_query = base_query.filter(follows::oid.gt(oid)),
        Some(Bound::Lt(oid)) => base_query = base_query.filter(follows::oid.lt(oid)),
        None => {}
    }

    base_query = match page.query_order() {
        SortOrder::Asc => base_query.order(follows::oid.asc()),
        SortOrder::Desc => base_query.order(follows::oid.desc()),
    };

    let rows: Vec<Follow> = base_query
        .limit(page.fetch_limit())
        .load(conn)
        .map_err(AppError::from_diesel)?;

    let listed_oid = |f: &Follow| match side {
        FollowSide::Followers => f.follower_oid,
        FollowSide::Following => f.followed_oid,
    };

    let user_oids: Vec<i64> = rows.iter().map(listed_oid).collect();
    let listed: HashMap<i64, User> = users::table
        .filter(users::oid.eq_any(&user_oids))
        .load::<User>(conn)
        .map_err(AppError::from_diesel)?
        .into_iter()
        .map(|u| (u.oid, u))
        .collect();

    page.respond(rows, |follow| {
        listed
            .get(&listed_oid(&follow))
            .map(|u| UserResponse::from_user(u, false))
            .ok_or(AppError::DatabaseError)
    })
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
