//! Cryptography module for diaryledger
//!
//! Provides AES-256-GCM payload encryption with PBKDF2-HMAC-SHA512 (or
//! Argon2id) key derivation, plus the keystore that pins the salt.

mod encryption;
mod kdf;
mod keystore;

pub use encryption::{decrypt, encrypt, EncryptedPayload};
pub use kdf::{derive_key, DerivedKey, KdfParams};
pub use keystore::{generate_salt, Keystore, KEYSTORE_VERSION};

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of generated salt for key derivation
pub const SALT_SIZE: usize = 32;

/// Smallest salt accepted by key derivation
pub const MIN_SALT_SIZE: usize = 16;

/// Default PBKDF2 iteration count
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 1_000_000;
