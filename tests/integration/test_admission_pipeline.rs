// Admission gates in front of the real routes

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;

use crate::common::{json_request, test_app, ScriptedDomainChecker, TestAppBuilder, PASSWORD};

fn assert_error_body(body: &serde_json::Value, status: StatusCode) {
    assert_eq!(body["status_code"], status.as_u16());
    assert_eq!(body["message"], status.canonical_reason().unwrap());
    assert!(body["description"].is_string());
}

#[tokio::test]
async fn test_unlisted_method_is_not_implemented() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/auth/signup")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert_error_body(&response.body, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(app.metrics.rejection_count("method_allowlist"), 1);
}

#[tokio::test]
async fn test_wrong_method_on_known_route() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/auth/signup")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_error_body(&response.body, StatusCode::METHOD_NOT_ALLOWED);
    let allow = response.headers.get(header::ALLOW).unwrap().to_str().unwrap();
    assert!(allow.contains("POST"), "{}", allow);
}

#[tokio::test]
async fn test_wrong_method_on_protected_route_skips_auth() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/auth/logout")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/catalog/items")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["description"], "no resource at /catalog/items");
}

#[tokio::test]
async fn test_long_uri_is_rejected() {
    let app = TestAppBuilder::new().config(|c| c.max_uri_length = 32).build();
    let uri = format!("/health?pad={}", "x".repeat(64));
    let request = Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::URI_TOO_LONG);
    assert_error_body(&response.body, StatusCode::URI_TOO_LONG);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = TestAppBuilder::new().config(|c| c.max_request_bytes = 256).build();
    let response = app
        .signup("alice", &format!("{}@example.com", "a".repeat(400)), PASSWORD)
        .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_size_is_checked_before_content_type() {
    let app = TestAppBuilder::new().config(|c| c.max_request_bytes = 256).build();
    let body = "x".repeat(1024);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/signup")
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();

    assert_eq!(app.send(request).await.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/signup")
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from("<signup/>"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(
        response.body["description"],
        "content type 'application/xml' is not supported"
    );
}

#[tokio::test]
async fn test_content_type_parameters_are_accepted() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/signup")
        .header(header::CONTENT_TYPE, "Application/JSON; charset=utf-8")
        .body(Body::from(
            json!({ "nickname": "alice", "email": "alice@example.com", "password": PASSWORD }).to_string(),
        ))
        .unwrap();

    assert_eq!(app.send(request).await.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_invalid_utf8_body_is_unprocessable() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(vec![b'{', 0xff, 0xfe, b'}']))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["description"], "request body is not valid UTF-8");
    assert_eq!(app.metrics.rejection_count("utf8"), 1);
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let app = TestAppBuilder::new()
        .config(|c| {
            c.rate_limit_per_minute = 1;
            c.rate_limit_burst = 1;
        })
        .build();

    let from = |peer: [u8; 4], forwarded: &str| {
        let mut request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .header("x-forwarded-for", forwarded)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        request
    };

    assert_eq!(app.send(from([203, 0, 113, 7], "1.1.1.1")).await.status, StatusCode::OK);
    // A different forwarded address from the same peer shares its bucket
    let limited = app.send(from([203, 0, 113, 7], "2.2.2.2")).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_error_body(&limited.body, StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(app.send(from([198, 51, 100, 2], "1.1.1.1")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_service_switch_off() {
    let app = TestAppBuilder::new().config(|c| c.service_available = false).build();
    let response = app.signup("alice", "alice@example.com", PASSWORD).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_error_body(&response.body, StatusCode::SERVICE_UNAVAILABLE);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_service_switch_precedes_method_check() {
    let app = TestAppBuilder::new().config(|c| c.service_available = false).build();
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/nowhere")
        .body(Body::empty())
        .unwrap();

    assert_eq!(app.send(request).await.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_slow_signup_times_out_without_side_effects() {
    let app = TestAppBuilder::new()
        .config(|c| c.request_timeout_secs = 1)
        .domains(ScriptedDomainChecker {
            delay: Some(Duration::from_secs(3)),
            ..ScriptedDomainChecker::default()
        })
        .build();

    let response = app.signup("alice", "alice@example.com", PASSWORD).await;
    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_error_body(&response.body, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(app.metrics.rejection_count("timeout"), 1);

    // The handler future is dropped; nothing lands later either
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(app.mailer.sent().is_empty());
    assert!(app.accounts.is_empty().await);
}

#[tokio::test]
async fn test_request_id_is_assigned() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert!(response.headers.contains_key("x-request-id"));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("x-request-id", "client-supplied-id")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers.get("x-request-id").unwrap(), "client-supplied-id");
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestAppBuilder::new()
        .config(|c| c.cors_allowed_origins = vec!["https://shop.example".to_string()])
        .build();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/auth/login")
        .header(header::ORIGIN, "https://shop.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(
        response.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://shop.example"
    );
}

#[tokio::test]
async fn test_json_request_helper_passes_all_gates() {
    let app = test_app();
    let request = json_request(
        Method::POST,
        "/auth/login",
        &json!({ "nickname": "nobody", "password": PASSWORD }),
    );
    assert_eq!(app.send(request).await.status, StatusCode::NOT_FOUND);
}
