// Credential codec properties

use base64::{engine::general_purpose::STANDARD, Engine as _};
use proptest::prelude::*;
use storefront_identity::core::credentials::{CredentialCodec, KdfParams, HASH_VERSION_TAG};
use storefront_identity::core::errors::CredentialError;

use crate::common::fast_codec;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_hash_then_compare_matches(password in "[a-zA-Z0-9!@#%^&*]{6,64}") {
        let codec = fast_codec();
        let digest = codec.hash_password(&password, None).unwrap();
        prop_assert!(codec.compare_hash_passwords(&password, &digest.hash, &digest.salt).unwrap());
    }

    #[test]
    fn prop_different_password_never_matches(
        password in "[a-z0-9]{6,32}",
        suffix in "[A-Z]{1,4}",
    ) {
        let codec = fast_codec();
        let digest = codec.hash_password(&password, None).unwrap();
        let other = format!("{}{}", password, suffix);
        prop_assert!(!codec.compare_hash_passwords(&other, &digest.hash, &digest.salt).unwrap());
    }
}

#[test]
fn test_hash_carries_version_tag_and_configured_length() {
    let codec = CredentialCodec::new(KdfParams {
        iterations: 1,
        memory_kib: 64,
        parallelism: 1,
        output_len: 48,
    })
    .unwrap();
    let digest = codec.hash_password("pw-123456", None).unwrap();

    let (tag, encoded) = digest.hash.split_once('$').unwrap();
    assert_eq!(tag, HASH_VERSION_TAG);
    assert_eq!(STANDARD.decode(encoded).unwrap().len(), 48);
}

#[test]
fn test_hash_from_other_params_still_verifies_by_its_length() {
    let short = CredentialCodec::new(KdfParams {
        iterations: 1,
        memory_kib: 64,
        parallelism: 1,
        output_len: 16,
    })
    .unwrap();
    let digest = short.hash_password("pw-123456", None).unwrap();

    // Same cost parameters, different default output length
    let long = fast_codec();
    assert!(long.compare_hash_passwords("pw-123456", &digest.hash, &digest.salt).unwrap());
}

#[test]
fn test_unknown_version_tag_is_mismatch() {
    let codec = fast_codec();
    let digest = codec.hash_password("pw-123456", None).unwrap();
    let legacy = digest.hash.replacen(HASH_VERSION_TAG, "bcrypt", 1);

    assert!(!codec.compare_hash_passwords("pw-123456", &legacy, &digest.salt).unwrap());
}

#[test]
fn test_short_salt_is_malformed() {
    let codec = fast_codec();
    let short_salt = STANDARD.encode([1u8; 4]);
    assert!(matches!(
        codec.hash_password("pw-123456", Some(&short_salt)),
        Err(CredentialError::MalformedSalt(_))
    ));
}
