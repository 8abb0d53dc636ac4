//! Integration Tests for the HTTP Routes

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use runterm::server::FALLBACK_INDEX;
use runterm::{create_app, Config, SessionManager};
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(index_path: PathBuf) -> Router {
    let mut config = Config::default();
    config.server.index_path = index_path;
    create_app(SessionManager::new(config))
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_index_served_when_present() {
    let dir = TempDir::new().unwrap();
    let index = dir.path().join("index.html");
    std::fs::write(&index, "<html><body>runner</body></html>").unwrap();

    let response = app(index)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"<html><body>runner</body></html>");
}

#[tokio::test]
async fn test_index_fallback_when_missing() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(dir.path().join("missing.html")), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, FALLBACK_INDEX);
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(dir.path().join("index.html")), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_unknown_route() {
    let dir = TempDir::new().unwrap();
    let (status, _) = get(app(dir.path().join("index.html")), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_is_permissive() {
    let dir = TempDir::new().unwrap();
    let response = app(dir.path().join("index.html"))
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
