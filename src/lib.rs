//! diaryledger - Encrypted, append-only note ledger
//!
//! Each note is stored as a block whose payload is AES-256-GCM encrypted
//! under a passphrase-derived key. Blocks are chained by SHA-256 so any
//! retroactive edit or reordering is detectable. Deletion is a logical
//! marker kept outside the hash chain.

pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod repository;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::{derive_key, DerivedKey, KdfParams, Keystore};
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{Block, Chain, NoteRecord, Record, ValidationReport};
    pub use crate::repository::{BlockRepository, MemoryRepository, SledRepository};
    pub use crate::service::DiaryService;
}
