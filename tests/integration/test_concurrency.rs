// Racing requests against the shared stores

use axum::http::{Method, StatusCode};
use tokio::task::JoinHandle;
use std::sync::Arc;

use crate::common::{test_app, PASSWORD};

async fn collect(handles: Vec<JoinHandle<StatusCode>>) -> Vec<StatusCode> {
    let mut statuses = Vec::with_capacity(handles.len());
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    statuses
}

#[tokio::test]
async fn test_concurrent_confirmations_create_one_account() {
    let app = Arc::new(test_app());
    app.signup("alice", "alice@example.com", PASSWORD).await;
    let token = app.mailer.last_token().unwrap();

    let attempts = (0..8).map(|_| {
        let app = app.clone();
        let token = token.clone();
        tokio::spawn(async move { app.confirm(&token).await.status })
    });
    let statuses = collect(attempts.collect()).await;

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert!(statuses
        .iter()
        .filter(|s| **s != StatusCode::CREATED)
        .all(|s| *s == StatusCode::NOT_FOUND));
    assert_eq!(app.accounts.len().await, 1);
}

#[tokio::test]
async fn test_competing_signups_for_one_nickname() {
    let app = Arc::new(test_app());
    for i in 0..4 {
        let response = app
            .signup("alice", &format!("alice{}@example.com", i), PASSWORD)
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }
    let tokens: Vec<String> = app
        .mailer
        .sent()
        .iter()
        .filter_map(|mail| crate::common::extract_token(&mail.text))
        .collect();
    assert_eq!(tokens.len(), 4);

    let attempts = tokens.into_iter().map(|token| {
        let app = app.clone();
        tokio::spawn(async move { app.confirm(&token).await.status })
    });
    let statuses = collect(attempts.collect()).await;

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 3);
    assert_eq!(app.accounts.len().await, 1);
}

#[tokio::test]
async fn test_concurrent_logouts_revoke_once() {
    let app = Arc::new(test_app());
    let token = app.register("alice", "alice@example.com").await;

    let attempts = (0..6).map(|_| {
        let app = app.clone();
        let token = token.clone();
        tokio::spawn(async move { app.authed(Method::POST, "/auth/logout", &token).await.status })
    });
    let statuses = collect(attempts.collect()).await;

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::NO_CONTENT).count(), 1);
    assert!(statuses
        .iter()
        .filter(|s| **s != StatusCode::NO_CONTENT)
        .all(|s| *s == StatusCode::UNAUTHORIZED));
}
