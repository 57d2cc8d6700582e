//! End-to-end tests against a real Postgres. Set `TEST_DATABASE_URL` to run them; without it
//! every test returns early.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use perch::{app_state::AppState, db::DbPool, models::*, routes, schema::*, test_utils::*};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard};
use tower::ServiceExt;

static TEST_MUTEX: Mutex<()> = Mutex::new(());

struct TestApp {
    router: Router,
    state: AppState,
    _guard: MutexGuard<'static, ()>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        cleanup_test_db(&self.state.db_pool);
    }
}

fn setup(storage_base_url: Option<String>) -> Option<TestApp> {
    let guard = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let Some(state) = create_test_app_state(storage_base_url) else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return None;
    };
    cleanup_test_db(&state.db_pool);

    Some(TestApp {
        router: routes::build_router(state.clone()),
        state,
        _guard: guard,
    })
}

macro_rules! test_app {
    () => {
        test_app!(None)
    };
    ($storage:expr) => {
        match setup($storage) {
            Some(app) => app,
            None => return,
        }
    };
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Registers a user and returns `(token, public user id)`.
    async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "correct-horse",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Inserts a tweet row directly, bypassing image upload.
    fn insert_tweet(&self, user_id: &str, text: Option<&str>) -> Tweet {
        let mut conn = self.state.db_pool.get().unwrap();
        let user_oid: i64 = users::table
            .filter(users::id.eq(user_id))
            .select(users::oid)
            .first(&mut conn)
            .unwrap();
        let (oid, id) = self.state.ids.next("tweet").unwrap();
        diesel::insert_into(tweets::table)
            .values(NewTweet {
                oid,
                id: id.clone(),
                user_oid,
                image_url: format!("https://media.test/tweets/{}.png", id),
                image_key: format!("tweets/{}.png", id),
                text: text.map(str::to_string),
            })
            .get_result(&mut conn)
            .unwrap()
    }
}

/// Makes every `event` on `table` fail until dropped.
struct FailingTrigger {
    pool: DbPool,
    table: &'static str,
}

impl FailingTrigger {
    fn install(pool: &DbPool, table: &'static str, event: &str) -> Self {
        let mut conn = pool.get().unwrap();
        conn.batch_execute(&format!(
            "CREATE OR REPLACE FUNCTION perch_test_reject() RETURNS trigger AS $$ \
             BEGIN RAISE EXCEPTION 'rejected for test'; END; $$ LANGUAGE plpgsql; \
             DROP TRIGGER IF EXISTS perch_test_reject ON {table}; \
             CREATE TRIGGER perch_test_reject BEFORE {event} ON {table} \
             FOR EACH ROW EXECUTE FUNCTION perch_test_reject();",
            table = table,
            event = event
        ))
        .unwrap();
        Self {
            pool: pool.clone(),
            table,
        }
    }
}

impl Drop for FailingTrigger {
    fn drop(&mut self) {
        if let Ok(mut conn) = self.pool.get() {
            conn.batch_execute(&format!(
                "DROP TRIGGER IF EXISTS perch_test_reject ON {}",
                self.table
            ))
            .ok();
        }
    }
}

fn tweet_request(token: &str, text: Option<&str>) -> Request<Body> {
    let boundary = "----PerchBoundary";
    Request::builder()
        .method("POST")
        .uri("/tweets")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(multipart_image(boundary, text)))
        .unwrap()
}

fn parse<T: DeserializeOwned>(body: Value) -> T {
    serde_json::from_value(body).unwrap()
}

fn multipart_image(boundary: &str, text: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(text) = text {
        body.push_str(&format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{t}\r\n",
            b = boundary,
            t = text
        ));
    }
    body.push_str(&format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"sunset.png\"\r\nContent-Type: image/png\r\n\r\nnot-really-a-png\r\n--{b}--\r\n",
        b = boundary
    ));
    body
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = test_app!();

    let (token, user_id) = app.register("alice").await;

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "login": "ALICE@example.com", "password": "correct-horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let auth: AuthResponse = parse(body);
    assert_eq!(auth.user.id, user_id);

    let (status, body) = app.call("GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let me: ProfileResponse = parse(body);
    assert_eq!(me.user.username, "alice");
    assert_eq!(me.user.email.as_deref(), Some("alice@example.com"));
    assert_eq!(me.tweets_count, 0);
}

#[tokio::test]
async fn test_register_duplicate_username_conflicts() {
    let app = test_app!();
    app.register("bob").await;

    let (status, body) = app
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "username": "bob",
                "email": "other@example.com",
                "password": "correct-horse",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username is already taken");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = test_app!();
    app.register("carol").await;

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "login": "carol", "password": "wrong-horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "login": "nobody", "password": "wrong-horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_delete_tweet_with_image() {
    let mut server = mockito::Server::new_async().await;
    let upload = server
        .mock(
            "PUT",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/tweets/user_.+\.png$".into()),
        )
        .match_header("Content-Type", "image/png")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let remove = server
        .mock(
            "DELETE",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/tweets/user_.+\.png$".into()),
        )
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let app = test_app!(Some(server.url()));
    let (token, user_id) = app.register("dave").await;
    let (other_token, _) = app.register("erin").await;

    let (status, body) = app.send(tweet_request(&token, Some("golden hour"))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let tweet: TweetResponse = parse(body);
    assert_eq!(tweet.text.as_deref(), Some("golden hour"));
    assert_eq!(tweet.author.id, user_id);
    assert!(tweet
        .image_url
        .starts_with(&format!("https://media.test/tweets/{}/", user_id)));
    upload.assert_async().await;

    let (status, _) = app
        .call("DELETE", &format!("/tweets/{}", tweet.id), Some(&other_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call("DELETE", &format!("/tweets/{}", tweet.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    remove.assert_async().await;

    let (status, _) = app
        .call("GET", &format!("/tweets/{}", tweet.id), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_like_and_unlike() {
    let app = test_app!();
    let (_, author_id) = app.register("frank").await;
    let (token, _) = app.register("grace").await;
    let tweet = app.insert_tweet(&author_id, Some("likeable"));
    let likes_uri = format!("/tweets/{}/likes", tweet.id);

    let (status, _) = app.call("POST", &likes_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.call("POST", &likes_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call("GET", &format!("/tweets/{}", tweet.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let view: TweetResponse = parse(body);
    assert_eq!(view.likes_count, 1);
    assert_eq!(view.liked_by_me, Some(true));

    let (status, body) = app.call("GET", &likes_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let likers: ListResponse<UserResponse> = parse(body);
    assert_eq!(likers.items.len(), 1);
    assert_eq!(likers.items[0].username, "grace");

    let (status, _) = app.call("DELETE", &likes_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("DELETE", &likes_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comments_flow() {
    let app = test_app!();
    let (owner_token, owner_id) = app.register("heidi").await;
    let (token, _) = app.register("ivan").await;
    let (stranger_token, _) = app.register("judy").await;
    let tweet = app.insert_tweet(&owner_id, None);
    let comments_uri = format!("/tweets/{}/comments", tweet.id);

    let (status, body) = app
        .call("POST", &comments_uri, Some(&token), Some(json!({ "text": "nice" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment: CommentResponse = parse(body);
    assert_eq!(comment.tweet_id, tweet.id);

    let (status, _) = app
        .call("POST", &comments_uri, Some(&token), Some(json!({ "text": "" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app.call("GET", &comments_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: ListResponse<CommentResponse> = parse(body);
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].author.username, "ivan");

    let comment_uri = format!("/comments/{}", comment.id);
    let (status, _) = app
        .call("DELETE", &comment_uri, Some(&stranger_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The tweet owner may remove comments left on their tweet.
    let (status, _) = app
        .call("DELETE", &comment_uri, Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_follow_feed_and_unfollow() {
    let app = test_app!();
    let (token, me_id) = app.register("kate").await;
    let (_, followed_id) = app.register("leo").await;
    let (_, stranger_id) = app.register("mia").await;

    app.insert_tweet(&followed_id, Some("from leo"));
    app.insert_tweet(&stranger_id, Some("from mia"));
    app.insert_tweet(&me_id, Some("from kate"));

    let follow_uri = format!("/users/{}/follow", followed_id);
    let (status, body) = app.call("POST", &follow_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let follow: FollowResponse = parse(body);
    assert_eq!(follow.follower_id, me_id);

    let (status, _) = app.call("POST", &follow_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.call("GET", "/feed", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let feed: ListResponse<TweetResponse> = parse(body);
    let texts: Vec<_> = feed
        .items
        .iter()
        .map(|t| t.text.clone().unwrap_or_default())
        .collect();
    assert_eq!(texts, vec!["from kate", "from leo"]);

    let (status, body) = app
        .call("GET", &format!("/users/{}/followers", followed_id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let followers: ListResponse<UserResponse> = parse(body);
    assert_eq!(followers.items.len(), 1);
    assert_eq!(followers.items[0].id, me_id);

    let (status, body) = app
        .call("GET", &format!("/users/{}", followed_id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let profile: ProfileResponse = parse(body);
    assert_eq!(profile.followers_count, 1);
    assert!(profile.user.email.is_none());

    let (status, _) = app.call("DELETE", &follow_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("DELETE", &follow_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_tweets_pagination() {
    let app = test_app!();
    let (_, user_id) = app.register("nina").await;

    let inserted: Vec<Tweet> = (0..5)
        .map(|i| app.insert_tweet(&user_id, Some(&format!("tweet {}", i))))
        .collect();

    let (status, body) = app.call("GET", "/tweets?limit=3", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let first: ListResponse<TweetResponse> = parse(body);
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.items[0].id, inserted[4].id);
    assert!(first.pagination.has_more_after);
    assert!(!first.pagination.has_more_before);

    let last_id = &first.items[2].id;
    let (status, body) = app
        .call("GET", &format!("/tweets?limit=3&after={}", last_id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let second: ListResponse<TweetResponse> = parse(body);
    let ids: Vec<_> = second.items.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids, vec![inserted[1].id.clone(), inserted[0].id.clone()]);
    assert!(!second.pagination.has_more_after);
    assert!(second.pagination.has_more_before);

    let (status, body) = app
        .call(
            "GET",
            &format!("/tweets?limit=2&before={}", inserted[1].id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let back: ListResponse<TweetResponse> = parse(body);
    let ids: Vec<_> = back.items.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids, vec![inserted[3].id.clone(), inserted[2].id.clone()]);
    assert!(back.pagination.has_more_before);

    let (status, _) = app
        .call("GET", "/tweets?after=tweet_missing", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_tweets_and_users() {
    let app = test_app!();
    let (_, user_id) = app.register("oscar_photos").await;
    app.insert_tweet(&user_id, Some("Mountains at dawn"));
    app.insert_tweet(&user_id, Some("City lights"));
    app.insert_tweet(&user_id, None);

    let (status, body) = app
        .call("GET", "/tweets/search?q=mountain", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let found: ListResponse<TweetResponse> = parse(body);
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].text.as_deref(), Some("Mountains at dawn"));

    let (status, body) = app.call("GET", "/users?q=PHOTO", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let users: ListResponse<UserResponse> = parse(body);
    assert_eq!(users.items.len(), 1);
    assert_eq!(users.items[0].username, "oscar_photos");
}

#[tokio::test]
async fn test_update_profile() {
    let app = test_app!();
    let (token, _) = app.register("pat").await;
    app.register("quinn").await;

    let (status, body) = app
        .call(
            "PATCH",
            "/users/me",
            Some(&token),
            Some(json!({ "bio": "  shooting film  " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let profile: ProfileResponse = parse(body);
    assert_eq!(profile.user.bio.as_deref(), Some("shooting film"));

    let (status, _) = app
        .call(
            "PATCH",
            "/users/me",
            Some(&token),
            Some(json!({ "username": "quinn" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call("GET", "/users/by-username/pat", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let profile: ProfileResponse = parse(body);
    assert_eq!(profile.user.bio.as_deref(), Some("shooting film"));
}

#[tokio::test]
async fn test_replacing_avatar_removes_previous_object() {
    let mut server = mockito::Server::new_async().await;
    let uploads = server
        .mock(
            "PUT",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/avatars/user_.+\.jpg$".into()),
        )
        .match_header("Content-Type", "image/jpeg")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;
    let removal = server
        .mock(
            "DELETE",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/avatars/user_.+\.jpg$".into()),
        )
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let app = test_app!(Some(server.url()));
    let (token, user_id) = app.register("rita").await;

    let boundary = "----PerchAvatar";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.jpg\"\r\nContent-Type: image/jpeg\r\n\r\njpeg-bytes\r\n--{b}--\r\n",
        b = boundary
    );

    let mut avatars = Vec::new();
    for _ in 0..2 {
        let (status, body) = app
            .send(
                Request::builder()
                    .method("PUT")
                    .uri("/users/me/avatar")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let profile: ProfileResponse = parse(body);
        avatars.push(profile.user.avatar.unwrap());
    }

    assert_ne!(avatars[0], avatars[1]);
    assert!(avatars[1].starts_with(&format!("https://media.test/avatars/{}/", user_id)));
    uploads.assert_async().await;
    removal.assert_async().await;
}

#[tokio::test]
async fn test_comment_author_deletes_own_comment() {
    let app = test_app!();
    let (_, owner_id) = app.register("sam").await;
    let (token, _) = app.register("tess").await;
    let tweet = app.insert_tweet(&owner_id, Some("hello"));
    let comments_uri = format!("/tweets/{}/comments", tweet.id);

    let (status, body) = app
        .call("POST", &comments_uri, Some(&token), Some(json!({ "text": "first" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment: CommentResponse = parse(body);

    let (status, body) = app
        .call("DELETE", &format!("/comments/{}", comment.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let deleted: CommentResponse = parse(body);
    assert_eq!(deleted.id, comment.id);
    assert_eq!(deleted.text, "first");

    let (_, body) = app.call("GET", &comments_uri, None, None).await;
    let listed: ListResponse<CommentResponse> = parse(body);
    assert!(listed.items.is_empty());
}

#[tokio::test]
async fn test_follow_unknown_user_not_found() {
    let app = test_app!();
    let (token, _) = app.register("uma").await;

    let (status, _) = app
        .call("POST", "/users/user_doesnotexist/follow", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call("DELETE", "/users/user_doesnotexist/follow", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleting_tweet_removes_likes_and_comments() {
    let mut server = mockito::Server::new_async().await;
    let remove = server
        .mock(
            "DELETE",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/tweets/tweet_.+\.png$".into()),
        )
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let app = test_app!(Some(server.url()));
    let (owner_token, owner_id) = app.register("vera").await;
    let (token, _) = app.register("walt").await;
    let tweet = app.insert_tweet(&owner_id, Some("short lived"));

    let (status, _) = app
        .call("POST", &format!("/tweets/{}/likes", tweet.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .call(
            "POST",
            &format!("/tweets/{}/comments", tweet.id),
            Some(&token),
            Some(json!({ "text": "bye" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call("DELETE", &format!("/tweets/{}", tweet.id), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let deleted: TweetResponse = parse(body);
    assert_eq!(deleted.likes_count, 1);
    assert_eq!(deleted.comments_count, 1);
    remove.assert_async().await;

    let mut conn = app.state.db_pool.get().unwrap();
    let remaining_likes: i64 = likes::table
        .filter(likes::tweet_oid.eq(tweet.oid))
        .count()
        .get_result(&mut conn)
        .unwrap();
    let remaining_comments: i64 = comments::table
        .filter(comments::tweet_oid.eq(tweet.oid))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(remaining_likes, 0);
    assert_eq!(remaining_comments, 0);
}

#[tokio::test]
async fn test_failed_tweet_delete_keeps_image() {
    let mut server = mockito::Server::new_async().await;
    let remove = server
        .mock(
            "DELETE",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/tweets/tweet_.+\.png$".into()),
        )
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let app = test_app!(Some(server.url()));
    let (token, user_id) = app.register("xena").await;
    let tweet = app.insert_tweet(&user_id, Some("sticky"));
    let tweet_uri = format!("/tweets/{}", tweet.id);

    let trigger = FailingTrigger::install(&app.state.db_pool, "tweets", "DELETE");
    let (status, _) = app.call("DELETE", &tweet_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = app.call("GET", &tweet_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let still_there: TweetResponse = parse(body);
    assert_eq!(still_there.image_url, tweet.image_url);
    drop(trigger);

    // The image is only removed once the row is actually gone.
    let (status, _) = app.call("DELETE", &tweet_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    remove.assert_async().await;
}

#[tokio::test]
async fn test_failed_tweet_insert_removes_uploaded_image() {
    let mut server = mockito::Server::new_async().await;
    let upload = server
        .mock(
            "PUT",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/tweets/user_.+\.png$".into()),
        )
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let remove = server
        .mock(
            "DELETE",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/tweets/user_.+\.png$".into()),
        )
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let app = test_app!(Some(server.url()));
    let (token, _) = app.register("yuri").await;

    let _trigger = FailingTrigger::install(&app.state.db_pool, "tweets", "INSERT");
    let (status, _) = app.send(tweet_request(&token, Some("lost"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    upload.assert_async().await;
    remove.assert_async().await;

    let (_, body) = app.call("GET", "/tweets", None, None).await;
    let listed: ListResponse<TweetResponse> = parse(body);
    assert!(listed.items.is_empty());
}

#[tokio::test]
async fn test_failed_avatar_update_removes_uploaded_image() {
    let mut server = mockito::Server::new_async().await;
    let upload = server
        .mock(
            "PUT",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/avatars/user_.+\.png$".into()),
        )
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let remove = server
        .mock(
            "DELETE",
            mockito::Matcher::Regex(r"^/buckets/test-bucket/objects/avatars/user_.+\.png$".into()),
        )
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let app = test_app!(Some(server.url()));
    let (token, _) = app.register("zara").await;

    let boundary = "----PerchAvatar";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\npng-bytes\r\n--{b}--\r\n",
        b = boundary
    );

    let trigger = FailingTrigger::install(&app.state.db_pool, "users", "UPDATE");
    let (status, _) = app
        .send(
            Request::builder()
                .method("PUT")
                .uri("/users/me/avatar")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    drop(trigger);

    upload.assert_async().await;
    remove.assert_async().await;

    let (_, body) = app.call("GET", "/auth/me", Some(&token), None).await;
    let me: ProfileResponse = parse(body);
    assert!(me.user.avatar.is_none());
}

