//! Password-based key derivation
//!
//! Turns a passphrase and a persisted salt into the 256-bit ledger key.
//! The default profile is PBKDF2 with HMAC-SHA512 at one million
//! iterations, so an unlock takes a noticeable fraction of a second.
//! Argon2id is offered as a memory-hard alternative.

use crate::crypto::{DEFAULT_PBKDF2_ITERATIONS, KEY_SIZE, MIN_SALT_SIZE};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use ring::pbkdf2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use zeroize::Zeroizing;

/// Key derivation profile
///
/// Pinned per ledger in the keystore: changing any parameter yields a
/// different key, exactly like a different salt would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KdfParams {
    /// PBKDF2 with HMAC-SHA512
    Pbkdf2Sha512 { iterations: u32 },

    /// Argon2id (v0x13)
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Pbkdf2Sha512 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Check the parameters without deriving anything
    pub fn validate(&self) -> Result<()> {
        match *self {
            KdfParams::Pbkdf2Sha512 { iterations } => {
                if iterations == 0 {
                    return Err(Error::KeyDerivation(
                        "PBKDF2 iteration count must be greater than 0".to_string(),
                    ));
                }
            }
            KdfParams::Argon2id { .. } => {
                self.argon2_params()?;
            }
        }
        Ok(())
    }

    fn argon2_params(&self) -> Result<Params> {
        match *self {
            KdfParams::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => Params::new(memory_kib, iterations, parallelism, Some(KEY_SIZE))
                .map_err(|e| Error::KeyDerivation(format!("Invalid Argon2 parameters: {}", e))),
            KdfParams::Pbkdf2Sha512 { .. } => Err(Error::KeyDerivation(
                "Not an Argon2 profile".to_string(),
            )),
        }
    }
}

/// Symmetric key derived from a passphrase
///
/// Never persisted; wiped from memory on drop.
#[derive(Clone)]
pub struct DerivedKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl DerivedKey {
    /// Wrap raw key material
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        DerivedKey {
            key: Zeroizing::new(bytes),
        }
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([redacted])")
    }
}

/// Derive the ledger key from a passphrase and salt
///
/// Pure and deterministic: the same inputs always give the same key.
/// Fails only on invalid input.
pub fn derive_key(passphrase: &str, salt: &[u8], params: &KdfParams) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        return Err(Error::KeyDerivation("Passphrase must not be empty".to_string()));
    }
    if salt.len() < MIN_SALT_SIZE {
        return Err(Error::KeyDerivation(format!(
            "Salt too short: {} bytes, need at least {}",
            salt.len(),
            MIN_SALT_SIZE
        )));
    }

    let mut output = Zeroizing::new([0u8; KEY_SIZE]);

    match *params {
        KdfParams::Pbkdf2Sha512 { iterations } => {
            let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
                Error::KeyDerivation("PBKDF2 iteration count must be greater than 0".to_string())
            })?;
            pbkdf2::derive(
                pbkdf2::PBKDF2_HMAC_SHA512,
                iterations,
                salt,
                passphrase.as_bytes(),
                &mut output[..],
            );
        }
        KdfParams::Argon2id { .. } => {
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);
            argon2
                .hash_password_into(passphrase.as_bytes(), salt, &mut output[..])
                .map_err(|e| Error::KeyDerivation(format!("Argon2 failed: {}", e)))?;
        }
    }

    Ok(DerivedKey { key: output })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams::Pbkdf2Sha512 { iterations: 1000 }
    }

    #[test]
    fn test_derive_deterministic() {
        let salt = [7u8; 32];
        let key1 = derive_key("correct-horse", &salt, &fast_params()).unwrap();
        let key2 = derive_key("correct-horse", &salt, &fast_params()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let key1 = derive_key("correct-horse", &[1u8; 32], &fast_params()).unwrap();
        let key2 = derive_key("correct-horse", &[2u8; 32], &fast_params()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let salt = [0u8; 32];
        let key1 = derive_key("correct-horse", &salt, &fast_params()).unwrap();
        let key2 = derive_key("battery-staple", &salt, &fast_params()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_iteration_count_changes_key() {
        let salt = [0u8; 32];
        let key1 = derive_key("pw", &salt, &KdfParams::Pbkdf2Sha512 { iterations: 1000 }).unwrap();
        let key2 = derive_key("pw", &salt, &KdfParams::Pbkdf2Sha512 { iterations: 1001 }).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let result = derive_key("", &[0u8; 32], &fast_params());
        assert!(matches!(result, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_short_salt_rejected() {
        let result = derive_key("pw", &[0u8; MIN_SALT_SIZE - 1], &fast_params());
        assert!(matches!(result, Err(Error::KeyDerivation(_))));

        // Exactly the minimum is fine
        assert!(derive_key("pw", &[0u8; MIN_SALT_SIZE], &fast_params()).is_ok());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let params = KdfParams::Pbkdf2Sha512 { iterations: 0 };
        assert!(params.validate().is_err());
        assert!(derive_key("pw", &[0u8; 32], &params).is_err());
    }

    #[test]
    fn test_argon2_profile() {
        let params = KdfParams::Argon2id {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        assert!(params.validate().is_ok());

        let key1 = derive_key("pw", &[3u8; 32], &params).unwrap();
        let key2 = derive_key("pw", &[3u8; 32], &params).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        // Different algorithm, different key
        let pbkdf = derive_key("pw", &[3u8; 32], &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), pbkdf.as_bytes());
    }

    #[test]
    fn test_argon2_invalid_params() {
        let params = KdfParams::Argon2id {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = DerivedKey::from_bytes([0xAB; KEY_SIZE]);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("ab"));
        assert!(!printed.contains("171"));
    }

    #[test]
    fn test_params_serialization() {
        let json = serde_json::to_string(&KdfParams::default()).unwrap();
        assert_eq!(json, r#"{"algorithm":"pbkdf2-sha512","iterations":1000000}"#);

        let parsed: KdfParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, KdfParams::default());
    }
}
