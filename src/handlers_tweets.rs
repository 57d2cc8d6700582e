use crate::app_state::AppState;
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::AppError;
use crate::media::{self, UploadedImage};
use crate::models::*;
use crate::pagination::{Bound, PageParams, SortOrder};
use crate::queries;
use crate::schema::*;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use std::collections::HashMap;

pub const MAX_SEARCH_LIMIT: i64 = 100;

/// Which tweets a listing covers.
pub(crate) enum TweetScope {
    All,
    Author(i64),
    /// Tweets by the viewer and everyone the viewer follows.
    Feed(i64),
}

pub(crate) fn viewer_oid(
    conn: &mut PgConnection,
    viewer: &MaybeAuthUser,
) -> Result<Option<i64>, AppError> {
    match &viewer.0 {
        Some(caller) => Ok(Some(caller.load(conn)?.oid)),
        None => Ok(None),
    }
}

pub(crate) fn tweet_page(
    conn: &mut PgConnection,
    query: ListQuery,
    scope: TweetScope,
    viewer: Option<i64>,
) -> Result<ListResponse<TweetResponse>, AppError> {
    let page = PageParams::from_query(query, SortOrder::Desc)?;

    let cursor = queries::cursor_oid(page.cursor(), |id| {
        tweets::table
            .filter(tweets::id.eq(id))
            .select(tweets::oid)
            .first(conn)
    })?;

    let mut base_query = tweets::table
        .inner_join(users::table)
        .select((Tweet::as_select(), User::as_select()))
        .into_boxed();

    base_query = match scope {
        TweetScope::All => base_query,
        TweetScope::Author(user_oid) => base_query.filter(tweets::user_oid.eq(user_oid)),
        TweetScope::Feed(user_oid) => base_query.filter(
            tweets::user_oid.eq(user_oid).or(tweets::user_oid.eq_any(
                follows::table
                    .filter(follows::follower_oid.eq(user_oid))
                    .select(follows::followed_oid),
            )),
        ),
    };

    match page.bound(cursor) {
        Some(Bound::Gt(oid)) => base_query = base_query.filter(tweets::oid.gt(oid)),
        Some(Bound::Lt(oid)) => base_query = base_query.filter(tweets::oid.lt(oid)),
        None => {}
    }

    base_query = match page.query_order() {
        SortOrder::Asc => base_query.order(tweets::oid.asc()),
        SortOrder::Desc => base_query.order(tweets::oid.desc()),
    };

    let rows: Vec<(Tweet, User)> = base_query
        .limit(page.fetch_limit())
        .load(conn)
        .map_err(AppError::from_diesel)?;

    let (rows, pagination) = page.finish(rows);

    Ok(ListResponse {
        items: queries::tweet_responses(conn, rows, viewer)?,
        pagination,
    })
}

pub async fn list_tweets(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<TweetResponse>>, AppError> {
    let mut conn = state.db_pool.get()?;
    let viewer = viewer_oid(&mut conn, &viewer)?;
    Ok(Json(tweet_page(&mut conn, query, TweetScope::All, viewer)?))
}

pub async fn feed(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<TweetResponse>>, AppError> {
    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;
    Ok(Json(tweet_page(
        &mut conn,
        query,
        TweetScope::Feed(me.oid),
        Some(me.oid),
    )?))
}

pub async fn search_tweets(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ListResponse<TweetResponse>>, AppError> {
    let terms = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest("Search query 'q' is required".to_string()))?
        .to_string();
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_SEARCH_LIMIT);

    let mut conn = state.db_pool.get()?;
    let viewer = viewer_oid(&mut conn, &viewer)?;

    let mut found: Vec<Tweet> = diesel::sql_query(
        "SELECT tweets.* FROM tweets \
         WHERE to_tsvector('english', coalesce(text, '')) @@ plainto_tsquery('english', $1) \
         ORDER BY ts_rank(to_tsvector('english', coalesce(text, '')), plainto_tsquery('english', $1)) DESC, \
                  oid DESC \
         LIMIT $2",
    )
    .bind::<Text, _>(terms.as_str())
    .bind::<BigInt, _>(limit + 1)
    .load(&mut conn)
    .map_err(AppError::from_diesel)?;

    let has_more = found.len() as i64 > limit;
    found.truncate(limit as usize);

    let author_oids: Vec<i64> = found.iter().map(|t| t.user_oid).collect();
    let authors: HashMap<i64, User> = users::table
        .filter(users::oid.eq_any(&author_oids))
        .load::<User>(&mut conn)
        .map_err(AppError::from_diesel)?
        .into_iter()
        .map(|u| (u.oid, u))
        .collect();

    let rows: Vec<(Tweet, User)> = found
        .into_iter()
        .filter_map(|t| authors.get(&t.user_oid).cloned().map(|u| (t, u)))
        .collect();

    tracing::debug!("Search '{}' matched {} tweets", terms, rows.len());

    Ok(Json(ListResponse {
        items: queries::tweet_responses(&mut conn, rows, viewer)?,
        pagination: PaginationResponse {
            has_more_before: false,
            has_more_after: has_more,
        },
    }))
}

pub async fn get_tweet(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(tweet_id): Path<String>,
) -> Result<Json<TweetResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let viewer = viewer_oid(&mut conn, &viewer)?;

    let (tweet, author): (Tweet, User) = tweets::table
        .inner_join(users::table)
        .filter(tweets::id.eq(&tweet_id))
        .select((Tweet::as_select(), User::as_select()))
        .first(&mut conn)
        .map_err(AppError::from_diesel)?;

    Ok(Json(queries::tweet_response(
        &mut conn, tweet, author, viewer,
    )?))
}

pub async fn create_tweet(
    State(state): State<AppState>,
    caller: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TweetResponse>), AppError> {
    let mut image: Option<UploadedImage> = None;
    let mut text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "image" => {
                image = Some(media::read_image(field, &state.config).await?);
            }
            "text" => {
                let value = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read text field: {}", e))
                })?;
                text = Some(value);
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| AppError::BadRequest("Missing image".to_string()))?;
    let text = normalize_text(text)?;

    let mut conn = state.db_pool.get()?;
    let author = caller.load(&mut conn)?;

    let (tweet_oid, tweet_id) = state.ids.next("tweet")?;
    let image_key = image.storage_key(&format!("tweets/{}", author.id), &tweet_id);

    state
        .storage_client
        .upload(&image_key, image.data, Some(&image.content_type))
        .await?;

    let new_tweet = NewTweet {
        oid: tweet_oid,
        id: tweet_id,
        user_oid: author.oid,
        image_url: state.storage_client.public_url(&image_key),
        image_key: image_key.clone(),
        text,
    };

    let tweet: Tweet = match diesel::insert_into(tweets::table)
        .values(&new_tweet)
        .get_result(&mut conn)
    {
        Ok(tweet) => tweet,
        Err(e) => {
            if let Err(cleanup) = state.storage_client.delete(&image_key).await {
                tracing::warn!("Failed to remove orphaned image {}: {}", image_key, cleanup);
            }
            return Err(AppError::from_diesel(e));
        }
    };

    tracing::info!("User {} created tweet {}", author.id, tweet.id);

    let response = queries::tweet_response(&mut conn, tweet, author.clone(), Some(author.oid))?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn delete_tweet(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(tweet_id): Path<String>,
) -> Result<Json<TweetResponse>, AppError> {
    let mut conn = state.db_pool.get()?;
    let me = caller.load(&mut conn)?;

    let tweet = queries::find_tweet(&mut conn, &tweet_id)?;
    if tweet.user_oid != me.oid {
        return Err(AppError::Forbidden);
    }

    let image_key = tweet.image_key.clone();
    let tweet_oid = tweet.oid;
    let response = queries::tweet_response(&mut conn, tweet, me.clone(), Some(me.oid))?;

    diesel::delete(tweets::table.find(tweet_oid))
        .execute(&mut conn)
        .map_err(AppError::from_diesel)?;

    tracing::info!("User {} deleted tweet {}", me.id, response.id);

    if let Err(e) = state.storage_client.delete(&image_key).await {
        tracing::warn!("Failed to remove image {} of deleted tweet: {}", image_key, e);
    }

    Ok(Json(response))
}

fn normalize_text(text: Option<String>) -> Result<Option<String>, AppError> {
    let text = text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    if let Some(ref t) = text {
        if t.chars().count() > MAX_TWEET_TEXT_CHARS {
            return Err(AppError::BadRequest(format!(
                "Text must be at most {} characters",
                MAX_TWEET_TEXT_CHARS
            )));
        }
    }

    Ok(text)
}
