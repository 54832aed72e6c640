//! Shared fixtures for module endpoint tests.
//!
//! Builds the full application router over an in-memory SQLite database so
//! tests exercise the same middleware, mounting, and error mapping as the
//! running server.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use folio_db::Db;
use folio_kernel::{settings::Settings, ModuleRegistry};

/// A fully-wired application over a fresh in-memory database.
pub async fn test_app() -> (Router, Db) {
    // A single connection keeps every query on the same in-memory database.
    let db = Db::connect("sqlite::memory:", 1).await.unwrap();
    let settings = Settings::default();

    let mut registry = ModuleRegistry::new();
    super::register_all(&mut registry);
    db.migrate(&registry.collect_migrations()).await.unwrap();

    let router = folio_http::build_router(&registry, &settings, &db).unwrap();
    (router, db)
}

/// Fire a single request at the app.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

/// Read a response body as JSON.
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| panic!("response body was not JSON"))
}

/// Register a user through the API and return their bearer token.
pub async fn register_user(app: &Router, username: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/api/accounts/register",
        None,
        Some(json!({ "username": username, "password": "correct-horse" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    body["token"].as_str().expect("token in response").to_string()
}

/// Promote an existing user to the given role, bypassing the API.
pub async fn set_role(db: &Db, username: &str, role: &str) {
    sqlx::query("UPDATE auth_user SET role = ?1 WHERE username = ?2")
        .bind(role)
        .bind(username)
        .execute(db.pool())
        .await
        .unwrap();
}
