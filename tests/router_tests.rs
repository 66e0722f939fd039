use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use blog_post_manager::{
    AppState, InMemoryRepository, create_router, models::UserRole,
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::test;
use tower::ServiceExt;

// base64("alice:password123"), base64("bob_:password456"), base64("admin:adminpass1")
const ALICE: &str = "Basic YWxpY2U6cGFzc3dvcmQxMjM=";
const BOB: &str = "Basic Ym9iXzpwYXNzd29yZDQ1Ng==";
const ADMIN: &str = "Basic YWRtaW46YWRtaW5wYXNzMQ==";
// base64("alice:wrongpass1")
const ALICE_WRONG: &str = "Basic YWxpY2U6d3JvbmdwYXNzMQ==";

// --- Test Harness ---

/// Router over an in-memory store holding alice (id 1), bob_ (id 2) and an
/// admin (id 3).
async fn spawn_router() -> Router {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let state = AppState::new(repo);

    state.users.create_user("alice", "password123").await.unwrap();
    state.users.create_user("bob_", "password456").await.unwrap();
    state.users.create_user("admin", "adminpass1").await.unwrap();
    state
        .users
        .add_role_to_user("admin", UserRole::Admin)
        .await
        .unwrap();

    create_router(state)
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    }
}

async fn create_post(app: &Router, auth: &str, title: &str) -> i64 {
    let res = send(
        app,
        Method::POST,
        "/posts",
        Some(auth),
        Some(json!({ "title": title, "content": "Some content" })),
    )
    .await;
    assert_eq!(res.status, StatusCode::CREATED);
    res.body["id"].as_i64().unwrap()
}

// --- Public Routes ---

#[test]
async fn test_health_check() {
    let app = spawn_router().await;
    let res = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, Value::String("ok".into()));
}

#[test]
async fn test_register_returns_201_with_location() {
    let app = spawn_router().await;

    let res = send(
        &app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "username": "carol", "password": "password789" })),
    )
    .await;

    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.headers[header::LOCATION], "/users/4");
    assert_eq!(res.body, json!({ "id": 4, "username": "carol" }));
    assert!(res.body.get("password").is_none());
}

#[test]
async fn test_register_duplicate_username_is_422() {
    let app = spawn_router().await;

    let res = send(
        &app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "username": "alice", "password": "password123" })),
    )
    .await;

    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        res.body,
        json!({
            "statuscode": 422,
            "message": "User with username (alice) already exists!",
            "details": "uri=/users"
        })
    );
}

#[test]
async fn test_register_validation_errors_are_keyed_by_field() {
    let app = spawn_router().await;

    let res = send(
        &app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "username": "carol", "password": "short" })),
    )
    .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body,
        json!({ "password": "Password has to be atleast 8 characters long!" })
    );
}

#[test]
async fn test_malformed_json_is_400() {
    let app = spawn_router().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body.get("body").is_some());
}

// --- Authentication ---

#[test]
async fn test_missing_credentials_is_401_with_challenge() {
    let app = spawn_router().await;

    let res = send(&app, Method::GET, "/posts", None, None).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.headers[header::WWW_AUTHENTICATE],
        "Basic realm=\"blog-post-manager\""
    );
}

#[test]
async fn test_wrong_password_is_401() {
    let app = spawn_router().await;
    let res = send(&app, Method::GET, "/posts", Some(ALICE_WRONG), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[test]
async fn test_non_basic_scheme_is_401() {
    let app = spawn_router().await;
    let res = send(&app, Method::GET, "/posts", Some("Bearer abc.def.ghi"), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

// --- Posts ---

#[test]
async fn test_create_post_sets_location_and_author() {
    let app = spawn_router().await;

    let res = send(
        &app,
        Method::POST,
        "/posts",
        Some(ALICE),
        Some(json!({ "title": "Hello", "content": "World!!" })),
    )
    .await;

    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.headers[header::LOCATION], "/posts/1");
    assert_eq!(res.body["author"], "alice");
    assert_eq!(res.body["title"], "Hello");
    assert!(res.body.get("createdAt").is_some());
    assert!(res.body.get("updatedAt").is_some());
}

#[test]
async fn test_title_length_boundaries() {
    let app = spawn_router().await;

    for (len, expected) in [
        (2, StatusCode::BAD_REQUEST),
        (3, StatusCode::CREATED),
        (255, StatusCode::CREATED),
        (256, StatusCode::BAD_REQUEST),
    ] {
        let res = send(
            &app,
            Method::POST,
            "/posts",
            Some(ALICE),
            Some(json!({ "title": "t".repeat(len), "content": "Some content" })),
        )
        .await;
        assert_eq!(res.status, expected, "title of {len} chars");
        if expected == StatusCode::BAD_REQUEST {
            assert_eq!(
                res.body["title"],
                "Title must be between 3 and 255 characters"
            );
        }
    }
}

#[test]
async fn test_blank_title_and_short_content() {
    let app = spawn_router().await;

    let res = send(
        &app,
        Method::POST,
        "/posts",
        Some(ALICE),
        Some(json!({ "title": "   ", "content": "ab" })),
    )
    .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["title"], "Title cannot be empty!");
    assert_eq!(res.body["content"], "Content must be atleast 3 characters long!");
}

#[test]
async fn test_missing_post_is_404_envelope() {
    let app = spawn_router().await;

    let res = send(&app, Method::GET, "/posts/99", Some(ALICE), None).await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(
        res.body,
        json!({
            "statuscode": 404,
            "message": "Cannot find post with id: 99",
            "details": "uri=/posts/99"
        })
    );
}

#[test]
async fn test_foreign_post_is_403_for_user_but_visible_to_admin() {
    let app = spawn_router().await;
    let id = create_post(&app, ALICE, "Private").await;
    let uri = format!("/posts/{id}");

    let res = send(&app, Method::GET, &uri, Some(BOB), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["message"], "This post does not belong to this author!");
    assert_eq!(res.body["details"], format!("uri={uri}"));

    let res = send(
        &app,
        Method::PUT,
        &uri,
        Some(BOB),
        Some(json!({ "title": "Hijack", "content": "nope" })),
    )
    .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = send(&app, Method::GET, &uri, Some(ADMIN), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["title"], "Private");
}

#[test]
async fn test_post_lifecycle() {
    let app = spawn_router().await;
    let id = create_post(&app, ALICE, "Draft").await;
    create_post(&app, BOB, "Bob's post").await;
    let uri = format!("/posts/{id}");

    let res = send(
        &app,
        Method::PUT,
        &uri,
        Some(ALICE),
        Some(json!({ "title": "Published", "content": "Final words" })),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["title"], "Published");
    assert_eq!(res.body["author"], "alice");

    let res = send(&app, Method::GET, "/posts", Some(ALICE), None).await;
    let list = res.body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["title"], "Published");
    // Summaries never carry the content.
    assert!(list[0].get("content").is_none());

    let res = send(&app, Method::GET, "/posts", Some(ADMIN), None).await;
    assert_eq!(res.body.as_array().unwrap().len(), 2);

    let res = send(&app, Method::DELETE, &uri, Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = send(&app, Method::GET, &uri, Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

// --- Users ---

#[test]
async fn test_get_user_by_id_or_username() {
    let app = spawn_router().await;

    let res = send(&app, Method::GET, "/users/2", Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({ "id": 2, "username": "bob_" }));

    let res = send(&app, Method::GET, "/users/alice", Some(BOB), None).await;
    assert_eq!(res.body, json!({ "id": 1, "username": "alice" }));

    let res = send(&app, Method::GET, "/users/ghost", Some(BOB), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["message"], "User with username (ghost) not found!");
}

#[test]
async fn test_list_users_requires_admin() {
    let app = spawn_router().await;

    let res = send(&app, Method::GET, "/users", Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["message"], "Access Denied");

    let res = send(&app, Method::GET, "/users", Some(ADMIN), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body.as_array().unwrap().len(), 3);
}

#[test]
async fn test_grant_and_revoke_role() {
    let app = spawn_router().await;

    let res = send(
        &app,
        Method::PATCH,
        "/users",
        Some(ADMIN),
        Some(json!({ "username": "alice", "role": "admin" })),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({ "username": "alice", "role": "ADMIN" }));

    // alice is now an admin herself.
    let res = send(&app, Method::GET, "/users", Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = send(&app, Method::DELETE, "/users/alice/role/Admin", Some(ADMIN), None).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = send(&app, Method::GET, "/users", Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[test]
async fn test_role_routes_reject_non_admin_and_bad_role() {
    let app = spawn_router().await;

    let res = send(
        &app,
        Method::PATCH,
        "/users",
        Some(BOB),
        Some(json!({ "username": "bob_", "role": "ADMIN" })),
    )
    .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = send(&app, Method::DELETE, "/users/alice/role/bogus", Some(ADMIN), None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body,
        json!({ "role": "The role provided is not a valid role!" })
    );

    let res = send(&app, Method::DELETE, "/users/ghost/role/USER", Some(ADMIN), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[test]
async fn test_delete_user_self_or_admin_only() {
    let app = spawn_router().await;

    let res = send(&app, Method::DELETE, "/users/1", Some(BOB), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = send(&app, Method::DELETE, "/users/alice", Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    // Her credentials no longer authenticate.
    let res = send(&app, Method::GET, "/posts", Some(ALICE), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = send(&app, Method::DELETE, "/users/bob_", Some(ADMIN), None).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
}

// --- Documentation ---

#[test]
async fn test_openapi_document_is_served() {
    let app = spawn_router().await;

    let res = send(&app, Method::GET, "/api-docs/openapi.json", None, None).await;

    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["paths"].get("/posts/{id}").is_some());
    assert!(res.body["components"]["securitySchemes"].get("basic_auth").is_some());
}
