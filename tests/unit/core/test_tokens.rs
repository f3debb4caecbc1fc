// Token issuer properties

use proptest::prelude::*;
use secrecy::SecretString;
use std::time::Duration;
use storefront_identity::core::errors::TokenError;
use storefront_identity::core::tokens::TokenIssuer;
use uuid::Uuid;

use crate::common::{token_issuer, TEST_SECRET};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_verify_returns_issued_subject(bytes in any::<[u8; 16]>()) {
        let id = Uuid::from_bytes(bytes);
        let issuer = token_issuer();
        let issued = issuer.issue(id).unwrap();
        let claims = issuer.verify(&issued.token).unwrap();
        prop_assert_eq!(claims.account_id(), Some(id));
        prop_assert_eq!(claims.exp - claims.iat, 21 * 24 * 60 * 60);
    }

    #[test]
    fn prop_any_payload_edit_is_rejected(flip in 0usize..16) {
        let issuer = token_issuer();
        let issued = issuer.issue(Uuid::new_v4()).unwrap();
        let mut parts: Vec<String> = issued.token.split('.').map(str::to_string).collect();
        let payload = parts[1].clone().into_bytes();
        let idx = flip % payload.len();
        let mut tampered = payload.clone();
        tampered[idx] = if payload[idx] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(tampered).unwrap();

        prop_assert_eq!(issuer.verify(&parts.join(".")), Err(TokenError::InvalidToken));
    }
}

#[test]
fn test_each_token_is_unique() {
    let issuer = token_issuer();
    let id = Uuid::new_v4();
    let a = issuer.issue(id).unwrap();
    let b = issuer.issue(id).unwrap();
    assert_ne!(a.token, b.token);
    assert_ne!(a.claims.jti, b.claims.jti);
}

#[tokio::test]
async fn test_short_lifetime_expires() {
    let issuer = TokenIssuer::new(&SecretString::new(TEST_SECRET.to_string()), Duration::from_secs(1));
    let issued = issuer.issue(Uuid::new_v4()).unwrap();
    assert!(issuer.verify(&issued.token).is_ok());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(issuer.verify(&issued.token), Err(TokenError::Expired));
}

#[test]
fn test_debug_hides_secret() {
    let issuer = token_issuer();
    assert!(!format!("{:?}", issuer).contains(TEST_SECRET));
}
