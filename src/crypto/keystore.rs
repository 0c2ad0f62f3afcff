//! Ledger keystore
//!
//! Holds the per-ledger salt and the KDF profile. Written exactly once when
//! the ledger is created and reused verbatim for every unlock: a new salt
//! would silently produce a different key and orphan every existing block.

use crate::crypto::{derive_key, DerivedKey, KdfParams, MIN_SALT_SIZE, SALT_SIZE};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Current keystore format version
pub const KEYSTORE_VERSION: u32 = 1;

/// Generate a fresh random salt from the OS CSPRNG
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Persisted key material parameters (not secret)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keystore {
    /// Format version
    pub version: u32,

    /// Salt for key derivation
    #[serde(with = "hex_serde")]
    salt: Vec<u8>,

    /// KDF profile pinned for this ledger
    pub kdf: KdfParams,
}

impl Keystore {
    /// Create a keystore with a fresh salt
    pub fn generate(kdf: KdfParams) -> Self {
        Keystore {
            version: KEYSTORE_VERSION,
            salt: generate_salt().to_vec(),
            kdf,
        }
    }

    /// Create a keystore around a known salt
    pub fn with_salt(salt: &[u8], kdf: KdfParams) -> Result<Self> {
        if salt.len() < MIN_SALT_SIZE {
            return Err(Error::KeyDerivation(format!(
                "Salt too short: {} bytes, need at least {}",
                salt.len(),
                MIN_SALT_SIZE
            )));
        }
        Ok(Keystore {
            version: KEYSTORE_VERSION,
            salt: salt.to_vec(),
            kdf,
        })
    }

    /// Get the salt
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Derive the ledger key for a passphrase
    pub fn derive_key(&self, passphrase: &str) -> Result<DerivedKey> {
        derive_key(passphrase, &self.salt, &self.kdf)
    }

    /// Load an existing keystore
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read keystore: {}", e))
        })?;

        let keystore: Keystore = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse keystore: {}", e))
        })?;

        if keystore.version != KEYSTORE_VERSION {
            return Err(Error::Config(format!(
                "Unsupported keystore version: {}",
                keystore.version
            )));
        }
        if keystore.salt.len() < MIN_SALT_SIZE {
            return Err(Error::Config(format!(
                "Keystore salt too short: {} bytes",
                keystore.salt.len()
            )));
        }
        keystore.kdf.validate()?;

        Ok(keystore)
    }

    /// Load the keystore, creating it with a fresh salt if absent
    ///
    /// Returns the keystore and whether it was newly created.
    pub fn load_or_create<P: AsRef<Path>>(path: P, default_kdf: KdfParams) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }

        default_kdf.validate()?;
        let keystore = Self::generate(default_kdf);
        keystore.save(path)?;
        info!("Created keystore at {:?}", path);
        Ok((keystore, true))
    }

    /// Write the keystore; never overwrites an existing file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::Config(format!("Failed to create keystore {:?}: {}", path, e)))?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }
}

/// Hex serialization for byte arrays
mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_params() -> KdfParams {
        KdfParams::Pbkdf2Sha512 { iterations: 1000 }
    }

    #[test]
    fn test_generate_salt_random() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_load_or_create_reuses_salt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keystore.json");

        let (first, created) = Keystore::load_or_create(&path, fast_params()).unwrap();
        assert!(created);
        assert_eq!(first.salt().len(), SALT_SIZE);

        let (second, created) = Keystore::load_or_create(&path, fast_params()).unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn test_pinned_kdf_wins_over_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keystore.json");

        Keystore::load_or_create(&path, fast_params()).unwrap();
        let (loaded, _) = Keystore::load_or_create(&path, KdfParams::default()).unwrap();

        assert_eq!(loaded.kdf, fast_params());
    }

    #[test]
    fn test_save_never_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keystore.json");

        Keystore::generate(fast_params()).save(&path).unwrap();
        let result = Keystore::generate(fast_params()).save(&path);

        assert!(result.is_err());
    }

    #[test]
    fn test_derive_key_from_keystore() {
        let keystore = Keystore::with_salt(&[0u8; 32], fast_params()).unwrap();

        let key1 = keystore.derive_key("correct-horse").unwrap();
        let key2 = derive_key("correct-horse", &[0u8; 32], &fast_params()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_with_short_salt_rejected() {
        assert!(Keystore::with_salt(&[0u8; 8], fast_params()).is_err());
    }

    #[test]
    fn test_corrupt_keystore_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keystore.json");
        let content = r#"{"version":1,"salt":"abcd",
            "kdf":{"algorithm":"pbkdf2-sha512","iterations":1000}}"#;
        std::fs::write(&path, content).unwrap();

        assert!(matches!(Keystore::load(&path), Err(Error::Config(_))));
    }
}
