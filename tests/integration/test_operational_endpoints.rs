// Health and metrics endpoints

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};

use crate::common::test_app;

fn get(uri: &str) -> Request<Body> {
    Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_backends() {
    let app = test_app();
    let response = app.send(get("/health")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["revocation_store"], "connected");
    assert_eq!(response.body["pending_store"], "connected");
    assert_eq!(response.body["account_directory"], "connected");
}

#[tokio::test]
async fn test_metrics_expose_operations_and_rejections() {
    let app = test_app();
    app.register("alice", "alice@example.com").await;
    app.send(
        Request::builder()
            .method(Method::DELETE)
            .uri("/auth/signup")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let response = app.send(get("/metrics")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("identity_operations_total"));
    assert!(response.text.contains("admission_rejections_total"));
    assert!(response.text.contains("method_allowlist"));
}
