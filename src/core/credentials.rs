// Password hashing (Argon2id) and constant-time verification

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::core::errors::CredentialError;

/// Version tag prefixed to every stored hash.
///
/// Bump when the KDF or its parameters change so old hashes can be told apart.
pub const HASH_VERSION_TAG: &str = "a2id1";

/// Length of generated salts in bytes
pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
    pub memory_kib: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 3,
            memory_kib: 64 * 1024,
            parallelism: 2,
            output_len: 32,
        }
    }
}

/// Encoded hash and salt as stored on an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    pub hash: String,
    pub salt: String,
}

/// Password hasher bound to fixed KDF parameters
#[derive(Debug, Clone)]
pub struct CredentialCodec {
    params: KdfParams,
}

impl CredentialCodec {
    /// Create a codec, rejecting parameter sets Argon2 would refuse at hash time
    pub fn new(params: KdfParams) -> Result<Self, CredentialError> {
        if params.output_len < Params::MIN_OUTPUT_LEN || params.output_len > Params::MAX_OUTPUT_LEN {
            return Err(CredentialError::Kdf(format!(
                "output length {} out of range",
                params.output_len
            )));
        }
        Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| CredentialError::Kdf(e.to_string()))?;
        Ok(Self { params })
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Hash a password. A fresh random salt is generated when `salt` is `None`.
    pub fn hash_password(
        &self,
        password: &str,
        salt: Option<&str>,
    ) -> Result<PasswordDigest, CredentialError> {
        let salt_bytes = match salt {
            Some(encoded) => decode_salt(encoded)?,
            None => generate_salt(),
        };

        let derived = self.derive(password.as_bytes(), &salt_bytes, self.params.output_len)?;

        Ok(PasswordDigest {
            hash: format!("{}${}", HASH_VERSION_TAG, STANDARD.encode(derived.as_slice())),
            salt: STANDARD.encode(&salt_bytes),
        })
    }

    /// Check a password against a stored hash and salt.
    ///
    /// Only a malformed salt is an error. A wrong password, an unknown version
    /// tag or an undecodable hash all yield `Ok(false)`.
    pub fn compare_hash_passwords(
        &self,
        password: &str,
        hash: &str,
        salt: &str,
    ) -> Result<bool, CredentialError> {
        let salt_bytes = decode_salt(salt)?;

        let encoded = match hash
            .strip_prefix(HASH_VERSION_TAG)
            .and_then(|rest| rest.strip_prefix('$'))
        {
            Some(encoded) => encoded,
            None => return Ok(false),
        };
        let expected = match STANDARD.decode(encoded) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(_) => return Ok(false),
        };
        if expected.len() < Params::MIN_OUTPUT_LEN || expected.len() > Params::MAX_OUTPUT_LEN {
            return Ok(false);
        }

        let derived = self.derive(password.as_bytes(), &salt_bytes, expected.len())?;
        Ok(derived.as_slice().ct_eq(expected.as_slice()).into())
    }

    fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
        output_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            None,
        )
        .map_err(|e| CredentialError::Kdf(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = Zeroizing::new(vec![0u8; output_len]);
        argon2
            .hash_password_into(password, salt, out.as_mut_slice())
            .map_err(|e| CredentialError::Kdf(e.to_string()))?;
        Ok(out)
    }
}

fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn decode_salt(encoded: &str) -> Result<Vec<u8>, CredentialError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CredentialError::MalformedSalt(e.to_string()))?;
    if bytes.len() < argon2::MIN_SALT_LEN {
        return Err(CredentialError::MalformedSalt(format!(
            "salt must be at least {} bytes, got {}",
            argon2::MIN_SALT_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}
