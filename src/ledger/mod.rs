//! Hash-linked ledger
//!
//! Blocks carry an encrypted record and the hash of their predecessor;
//! the chain owns the in-memory sequence and talks to durable storage only
//! through [`crate::repository::BlockRepository`].

mod block;
mod chain;
mod record;
mod validation;

pub use block::{Block, HASH_HEX_LEN, ZERO_HASH};
pub use chain::{ActiveEntry, Chain};
pub use record::{NoteRecord, Record, GENESIS_SENTINEL};
pub use validation::{validate_blocks, ChainViolation, ValidationReport};

use ring::digest::{digest, SHA256};

/// SHA-256 of `data`, lower-case hex
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest(&SHA256, data).as_ref())
}
