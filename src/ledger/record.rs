//! Logical records carried inside blocks
//!
//! Each block payload is one tagged record, encoded as JSON before
//! encryption. Unknown shapes fail with a decode error instead of being
//! read loosely.

use crate::error::{Error, Result};
use crate::ledger::sha256_hex;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel stored in the genesis block
pub const GENESIS_SENTINEL: &str = "Genesis Block";

/// A logical record stored in a block payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Record {
    /// Fixed sentinel used to check a candidate key
    Genesis { sentinel: String },

    /// A diary note
    Note(NoteRecord),
}

impl Record {
    /// The genesis sentinel record
    pub fn genesis() -> Self {
        Record::Genesis {
            sentinel: GENESIS_SENTINEL.to_string(),
        }
    }

    /// Whether this is the exact genesis sentinel
    pub fn is_genesis_sentinel(&self) -> bool {
        matches!(self, Record::Genesis { sentinel } if sentinel == GENESIS_SENTINEL)
    }

    /// Canonical byte encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from decrypted bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Get the note, if this is one
    pub fn into_note(self) -> Option<NoteRecord> {
        match self {
            Record::Note(note) => Some(note),
            Record::Genesis { .. } => None,
        }
    }
}

/// Note content plus metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteRecord {
    /// Note body
    pub content: String,
    /// When the note was written (RFC 3339)
    pub created_at: String,
    /// SHA-256 hex of `content`
    pub content_hash: String,
    /// Index of the block this note replaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_from: Option<u64>,
}

impl NoteRecord {
    /// Create a note stamped with the current time
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        NoteRecord {
            content_hash: sha256_hex(content.as_bytes()),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            content,
            updated_from: None,
        }
    }

    /// Mark this note as the replacement for `index`
    pub fn with_updated_from(mut self, index: u64) -> Self {
        self.updated_from = Some(index);
        self
    }

    /// Check `content_hash` against `content`
    pub fn verify_content_hash(&self) -> bool {
        self.content_hash == sha256_hex(self.content.as_bytes())
    }
}
