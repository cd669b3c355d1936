//! Router-level tests for the feed, driven through `tower::ServiceExt::oneshot`.
//!
//! Users and sessions are seeded straight into the database so only the
//! signup test pays for bcrypt.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use postfeed::auth::session;
use postfeed::config::{Cli, Config};
use postfeed::db;
use postfeed::routes;
use postfeed::state::AppState;

const BOUNDARY: &str = "postfeed-test-boundary";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake image bytes";

struct TestApp {
    dir: TempDir,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let cli = Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(dir.path().to_path_buf()),
        };
        let config = Config::load(&cli).unwrap();
        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let state = AppState::new(pool, config);
        Self { dir, state }
    }

    fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    /// Creates a user with a live session and returns (user id, bearer token).
    async fn user(&self, name: &str) -> (String, String) {
        let user = self
            .state
            .users
            .create(&format!("{}@example.com", name.to_lowercase()), name, "not-a-hash")
            .await
            .unwrap();
        let token = session::create_session(&self.state.db, &user.id, 1).unwrap();
        (user.id.to_string(), token)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn create_post(&self, token: &str, title: &str) -> Value {
        let (status, body) = self
            .send(multipart_request(
                Method::POST,
                "/feed/post",
                Some(token),
                &[("title", title), ("content", "Some post content")],
                Some(("photo.png", "image/png", PNG)),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body["post"].clone()
    }
}

fn multipart_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    image: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, data)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

// ============================================================================
// AUTH
// ============================================================================

#[tokio::test]
async fn test_signup_then_login_issues_a_working_token() {
    let app = TestApp::new();

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            "/auth/signup",
            None,
            json!({"email": "Ann@Example.com", "name": "Ann", "password": "secret"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User created!");
    let user_id = body["userId"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            "/auth/signup",
            None,
            json!({"email": "ann@example.com", "name": "Ann", "password": "secret"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "E-Mail address already exists!");

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({"email": "ann@example.com", "password": "wrong"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({"email": "ann@example.com", "password": "secret"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], user_id.as_str());
    let token = body["token"].as_str().unwrap().to_string();

    let post = app.create_post(&token, "First").await;
    assert_eq!(post["creator"]["_id"], user_id.as_str());
    assert_eq!(post["creator"]["name"], "Ann");
}

#[tokio::test]
async fn test_signup_reports_invalid_fields() {
    let app = TestApp::new();
    let (status, body) = app
        .send(json_request(
            Method::PUT,
            "/auth/signup",
            None,
            json!({"email": "nope", "name": "", "password": "1"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_mutations_require_a_session() {
    let app = TestApp::new();

    let (status, body) = app
        .send(multipart_request(
            Method::POST,
            "/feed/post",
            None,
            &[("title", "Hello"), ("content", "Some post content")],
            Some(("photo.png", "image/png", PNG)),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authenticated.");

    let (status, _) = app
        .send(empty_request(Method::DELETE, "/feed/post/anything", Some("bogus")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// POST LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_create_then_fetch_post() {
    let app = TestApp::new();
    let (user_id, token) = app.user("Ann").await;

    let (status, body) = app
        .send(multipart_request(
            Method::POST,
            "/feed/post",
            Some(&token),
            &[("title", "  Hello  "), ("content", "Some post content")],
            Some(("photo.png", "image/png", PNG)),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Post created successfully!");
    assert_eq!(body["creator"], json!({"_id": user_id, "name": "Ann"}));

    let post = &body["post"];
    assert_eq!(post["title"], "Hello");
    let id = post["_id"].as_str().unwrap();
    let image_url = post["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with("images/"));
    assert!(app.dir.path().join(image_url).exists());

    let (status, body) = app
        .send(empty_request(Method::GET, &format!("/feed/post/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Post fetched.");
    assert_eq!(body["post"], *post);

    let (status, _) = app
        .send(empty_request(Method::GET, &format!("/{image_url}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_rejects_bad_input_without_storing() {
    let app = TestApp::new();
    let (_, token) = app.user("Ann").await;

    let (status, body) = app
        .send(multipart_request(
            Method::POST,
            "/feed/post",
            Some(&token),
            &[("title", "Hello"), ("content", "Some post content")],
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "No image provided.");

    let (status, body) = app
        .send(multipart_request(
            Method::POST,
            "/feed/post",
            Some(&token),
            &[("title", " "), ("content", "tiny")],
            Some(("photo.png", "image/png", PNG)),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Validation failed, entered data is incorrect.");
    let fields: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["content", "title"]);

    let (status, _) = app
        .send(multipart_request(
            Method::POST,
            "/feed/post",
            Some(&token),
            &[("title", "Hello"), ("content", "Some post content")],
            Some(("notes.txt", "text/plain", b"hello")),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let stored = std::fs::read_dir(app.dir.path().join("images"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(stored, 0, "No file should be kept for a rejected post");
}

#[tokio::test]
async fn test_unknown_post_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .send(empty_request(Method::GET, "/feed/post/missing", None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Could not find post.");
}

#[tokio::test]
async fn test_only_the_creator_may_update_or_delete() {
    let app = TestApp::new();
    let (_, owner) = app.user("Ann").await;
    let (_, other) = app.user("Bob").await;
    let post = app.create_post(&owner, "Mine").await;
    let id = post["_id"].as_str().unwrap();

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/feed/post/{id}"),
            Some(&other),
            json!({"title": "Stolen", "content": "Not my post", "image": post["imageUrl"]}),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Not authorized!");

    let (status, _) = app
        .send(empty_request(Method::DELETE, &format!("/feed/post/{id}"), Some(&other)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(empty_request(Method::GET, &format!("/feed/post/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["title"], "Mine");
}

#[tokio::test]
async fn test_update_keeps_or_replaces_the_image() {
    let app = TestApp::new();
    let (_, token) = app.user("Ann").await;
    let post = app.create_post(&token, "Original").await;
    let id = post["_id"].as_str().unwrap();
    let old_url = post["imageUrl"].as_str().unwrap().to_string();

    // JSON update naming the current image keeps it
    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/feed/post/{id}"),
            Some(&token),
            json!({"title": "Edited", "content": "Edited content", "image": old_url}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Post updated!");
    assert_eq!(body["post"]["title"], "Edited");
    assert_eq!(body["post"]["imageUrl"], old_url.as_str());
    assert!(app.dir.path().join(&old_url).exists());

    // Multipart update with a new file replaces it
    let (status, body) = app
        .send(multipart_request(
            Method::PUT,
            &format!("/feed/post/{id}"),
            Some(&token),
            &[("title", "Edited again"), ("content", "Edited content")],
            Some(("new.jpg", "image/jpeg", b"jpeg bytes")),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_url = body["post"]["imageUrl"].as_str().unwrap();
    assert_ne!(new_url, old_url);
    assert!(app.dir.path().join(new_url).exists());
    assert!(!app.dir.path().join(&old_url).exists());

    // Neither a file nor a URL
    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/feed/post/{id}"),
            Some(&token),
            json!({"title": "Edited", "content": "Edited content"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "No image provided.");
}

#[tokio::test]
async fn test_delete_removes_post_and_image() {
    let app = TestApp::new();
    let (user_id, token) = app.user("Ann").await;
    let post = app.create_post(&token, "Short lived").await;
    let id = post["_id"].as_str().unwrap();
    let image_path = app.dir.path().join(post["imageUrl"].as_str().unwrap());

    let (status, body) = app
        .send(empty_request(Method::DELETE, &format!("/feed/post/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Deleted post.");
    assert!(!image_path.exists());

    let (status, _) = app
        .send(empty_request(Method::GET, &format!("/feed/post/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(empty_request(Method::DELETE, &format!("/feed/post/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let refs = app
        .state
        .users
        .post_ids(&postfeed::feed::UserId::new(user_id))
        .await
        .unwrap();
    assert!(refs.is_empty());
}

// ============================================================================
// PAGINATION
// ============================================================================

#[tokio::test]
async fn test_pages_are_newest_first() {
    let app = TestApp::new();
    let (_, token) = app.user("Ann").await;
    for n in 1..=5 {
        app.create_post(&token, &format!("Post {n}")).await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let titles = |body: &Value| -> Vec<String> {
        body["posts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["title"].as_str().unwrap().to_string())
            .collect()
    };

    let (status, body) = app
        .send(empty_request(Method::GET, "/feed/posts", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Fetched posts successfully.");
    assert_eq!(body["totalItems"], 5);
    assert_eq!(titles(&body), vec!["Post 5", "Post 4"]);

    let (_, body) = app
        .send(empty_request(Method::GET, "/feed/posts?page=3", None))
        .await;
    assert_eq!(titles(&body), vec!["Post 1"]);

    let (status, body) = app
        .send(empty_request(Method::GET, "/feed/posts?page=4", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(titles(&body).is_empty());
    assert_eq!(body["totalItems"], 5);

    let (_, body) = app
        .send(empty_request(Method::GET, "/feed/posts?page=0", None))
        .await;
    assert_eq!(titles(&body), vec!["Post 5", "Post 4"]);
}
