//! Diary service
//!
//! Owns everything around the ledger core: the keystore and its salt, key
//! derivation, choosing a repository, and turning chain results into
//! note-level operations.

use crate::config::{Config, StorageBackend};
use crate::crypto::Keystore;
use crate::error::{Error, Result};
use crate::ledger::{ActiveEntry, Chain, NoteRecord, Record, ValidationReport};
use crate::repository::{BlockRepository, JsonFileRepository, SledRepository};
use tracing::info;

/// A note as shown to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    pub index: u64,
    /// Block timestamp
    pub timestamp: String,
    pub content: String,
    pub created_at: String,
    pub updated_from: Option<u64>,
    pub deleted: bool,
}

impl NoteEntry {
    fn from_note(index: u64, timestamp: &str, note: NoteRecord, deleted: bool) -> Self {
        NoteEntry {
            index,
            timestamp: timestamp.to_string(),
            content: note.content,
            created_at: note.created_at,
            updated_from: note.updated_from,
            deleted,
        }
    }
}

impl From<ActiveEntry> for NoteEntry {
    fn from(entry: ActiveEntry) -> Self {
        NoteEntry::from_note(entry.index, &entry.timestamp, entry.note, false)
    }
}

/// Ledger summary
#[derive(Debug, Clone)]
pub struct LedgerStatus {
    /// Blocks including genesis
    pub blocks: u64,
    pub active_notes: u64,
    pub deleted_notes: u64,
    pub tail_index: u64,
    pub tail_hash: String,
}

/// Open a repository for the configured backend
pub fn open_repository(config: &Config) -> Result<Box<dyn BlockRepository>> {
    let path = config.ledger_path();
    let repository: Box<dyn BlockRepository> = match config.storage.backend {
        StorageBackend::Sled => Box::new(SledRepository::open(&path)?),
        StorageBackend::JsonFile => Box::new(JsonFileRepository::open(&path)?),
    };
    Ok(repository)
}

/// Note-level API over an unlocked chain
pub struct DiaryService<R: BlockRepository = Box<dyn BlockRepository>> {
    chain: Chain<R>,
}

impl DiaryService {
    /// Open (or create) the configured ledger and unlock it
    pub fn open(config: &Config, passphrase: &str) -> Result<Self> {
        config.validate()?;
        config.ensure_directories()?;

        let repository = open_repository(config)?;
        let keystore_path = config.keystore_path();

        let keystore = if keystore_path.exists() {
            Keystore::load(&keystore_path)?
        } else {
            // A fresh salt for an existing ledger would orphan every block
            if repository.tail()?.is_some() {
                return Err(Error::KeystoreMissing(keystore_path));
            }
            let (keystore, _) = Keystore::load_or_create(&keystore_path, config.kdf)?;
            keystore
        };

        let service = Self::with_repository(repository, &keystore, passphrase)?;
        info!(
            "Diary opened ({} backend at {:?})",
            config.storage.backend.name(),
            config.ledger_path()
        );
        Ok(service)
    }
}

impl<R: BlockRepository> DiaryService<R> {
    /// Unlock a ledger over an explicit repository
    pub fn with_repository(repository: R, keystore: &Keystore, passphrase: &str) -> Result<Self> {
        let key = keystore.derive_key(passphrase)?;
        let chain = Chain::open(repository, key)?;
        Ok(DiaryService { chain })
    }

    /// Write a new note; returns its index
    pub fn add_note(&mut self, content: &str) -> Result<u64> {
        self.chain.append(NoteRecord::new(content))
    }

    /// Replace a note's content; returns the new index
    pub fn update_note(&mut self, index: u64, content: &str) -> Result<u64> {
        self.chain.logical_update(index, NoteRecord::new(content))
    }

    /// Hide a note from listings
    pub fn delete_note(&mut self, index: u64) -> Result<()> {
        self.chain.mark_deleted(index)
    }

    /// Current notes, oldest first
    pub fn notes(&self) -> Result<Vec<NoteEntry>> {
        Ok(self
            .chain
            .list_active()?
            .into_iter()
            .map(NoteEntry::from)
            .collect())
    }

    /// One note by index, including deleted ones
    pub fn note(&self, index: u64) -> Result<NoteEntry> {
        if index == 0 {
            return Err(Error::InvalidIndex {
                index,
                len: self.chain.len(),
            });
        }

        let note = match self.chain.read(index)? {
            Record::Note(note) => note,
            Record::Genesis { .. } => {
                return Err(Error::Decode(format!("block {} holds no note", index)))
            }
        };
        let timestamp = self
            .chain
            .blocks()
            .get(index as usize)
            .map(|b| b.timestamp().to_string())
            .unwrap_or_default();

        Ok(NoteEntry::from_note(
            index,
            &timestamp,
            note,
            self.chain.is_deleted(index),
        ))
    }

    /// Check the stored chain
    pub fn verify(&self) -> ValidationReport {
        self.chain.validate_report()
    }

    /// Ledger summary
    pub fn status(&self) -> Result<LedgerStatus> {
        let tail = self.chain.tail()?;
        Ok(LedgerStatus {
            blocks: self.chain.len(),
            active_notes: self.chain.active_count(),
            deleted_notes: self.chain.deleted_indices().len() as u64,
            tail_index: tail.index(),
            tail_hash: tail.hash().to_string(),
        })
    }

    /// Underlying chain
    pub fn chain(&self) -> &Chain<R> {
        &self.chain
    }
}
