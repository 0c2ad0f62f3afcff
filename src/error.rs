//! Error types for diaryledger

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for diaryledger
#[derive(Error, Debug)]
pub enum Error {
    // Crypto errors
    #[error("Authentication failed: ciphertext rejected (wrong passphrase or tampered data)")]
    Authentication,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Keystore missing at {0:?} but the ledger already holds blocks")]
    KeystoreMissing(PathBuf),

    // Ledger errors
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid index {index} (chain length {len})")]
    InvalidIndex { index: u64, len: u64 },

    #[error("Chain has no tail block")]
    ChainEmpty,

    #[error("Ledger corrupt: {0}")]
    Corrupt(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures that indicate a wrong key or tampered ciphertext
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Durable storage failures, wrapped into [`Error::Repository`]
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Stored data unreadable: {0}")]
    Serialization(String),

    #[error("Append conflict: expected index {expected}, got {got}")]
    Conflict { expected: u64, got: u64 },

    #[error("Injected failure")]
    Injected,
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::Serialization(e.to_string())
    }
}
