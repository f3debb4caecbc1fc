// Concurrent access to the in-memory stores

use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use storefront_identity::core::errors::StoreError;
use storefront_identity::core::models::PendingRegistration;
use storefront_identity::state::memory_store::{MemoryPendingStore, MemoryRevocationStore};
use storefront_identity::state::{PendingRegistrationStore, RevocationStore};

fn pending(token: &str) -> PendingRegistration {
    PendingRegistration {
        confirmation_token: token.to_string(),
        nickname: "alice".to_string(),
        email: "alice@example.com".to_string(),
        password: SecretString::new("secret1".to_string()),
        created_at: Utc::now(),
        ttl: Duration::from_secs(60),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_take_has_single_winner() {
    let store: Arc<dyn PendingRegistrationStore> = Arc::new(MemoryPendingStore::new());
    store.create(pending("tok")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.take("tok").await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_revoke_has_single_success() {
    let store: Arc<dyn RevocationStore> = Arc::new(MemoryRevocationStore::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.revoke("session-token", Duration::from_secs(60)).await
        }));
    }

    let mut ok = 0;
    let mut already = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(StoreError::AlreadyRevoked) => already += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(already, 15);
    assert!(store.is_revoked("session-token").await.unwrap());
}

#[tokio::test]
async fn test_delete_removes_pending() {
    let store = MemoryPendingStore::new();
    store.create(pending("tok")).await.unwrap();
    store.delete("tok").await.unwrap();
    assert!(store.get("tok").await.unwrap().is_none());
    // Deleting again is not an error
    store.delete("tok").await.unwrap();
}

#[tokio::test]
async fn test_revocation_marker_expires() {
    let store = MemoryRevocationStore::new();
    store.revoke("short", Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!store.is_revoked("short").await.unwrap());
}
