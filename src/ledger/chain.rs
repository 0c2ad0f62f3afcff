//! Append-only chain
//!
//! Opening a chain moves it through two transitions: an empty repository
//! gets its genesis block, then the candidate key must decrypt the genesis
//! sentinel. A `Chain` value therefore always represents an unlocked ledger.
//!
//! Mutations take `&mut self` and reads take `&self`, so the borrow checker
//! enforces the single-writer model: reads may share the chain, but never
//! overlap an append or a delete.

use crate::crypto::DerivedKey;
use crate::error::{Error, Result};
use crate::ledger::{validate_blocks, Block, ChainViolation, NoteRecord, Record, ValidationReport};
use crate::repository::BlockRepository;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A decrypted, non-deleted note and where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub index: u64,
    /// Block timestamp
    pub timestamp: String,
    pub note: NoteRecord,
}

/// Unlocked ledger over a block repository
pub struct Chain<R: BlockRepository> {
    repository: R,
    key: DerivedKey,
    /// In-memory copy of the block sequence, index == position
    blocks: Vec<Block>,
    /// Logically deleted indices (never part of any hash)
    deleted: BTreeSet<u64>,
}

impl<R: BlockRepository> Chain<R> {
    /// Open a chain, creating genesis if the repository is empty
    ///
    /// Fails with [`Error::Authentication`] when `key` cannot decrypt the
    /// genesis sentinel; no other block is decrypted before that check.
    pub fn open(repository: R, key: DerivedKey) -> Result<Self> {
        let genesis = match repository.get(0)? {
            Some(genesis) => genesis,
            None => {
                if let Some(tail) = repository.tail()? {
                    return Err(Error::Corrupt(format!(
                        "genesis missing but block {} present",
                        tail.index()
                    )));
                }
                let genesis = Block::genesis(&key)?;
                repository.persist(&genesis)?;
                info!("Created genesis block {}", short_hash(genesis.hash()));
                genesis
            }
        };

        Self::verify_genesis(&genesis, &key)?;

        let blocks = repository.all()?;
        for (position, block) in blocks.iter().enumerate() {
            if block.index() != position as u64 {
                return Err(Error::Corrupt(format!(
                    "block at position {} has index {}",
                    position,
                    block.index()
                )));
            }
        }
        if blocks.first() != Some(&genesis) {
            return Err(Error::Corrupt("genesis changed while opening".to_string()));
        }

        let deleted = repository.deleted_indices()?;
        let len = blocks.len() as u64;
        if let Some(&bad) = deleted.iter().find(|&&i| i == 0 || i >= len) {
            return Err(Error::Corrupt(format!(
                "deleted index {} outside chain of length {}",
                bad, len
            )));
        }

        info!(
            "Ledger unlocked: {} blocks, {} deleted",
            blocks.len(),
            deleted.len()
        );

        Ok(Chain {
            repository,
            key,
            blocks,
            deleted,
        })
    }

    fn verify_genesis(genesis: &Block, key: &DerivedKey) -> Result<()> {
        let record = genesis.decrypt_record(key)?;
        if !record.is_genesis_sentinel() {
            return Err(Error::Corrupt("genesis sentinel mismatch".to_string()));
        }
        Ok(())
    }

    /// Check a candidate key against the genesis sentinel
    pub fn verify_key(&self, key: &DerivedKey) -> Result<()> {
        let genesis = self.blocks.first().ok_or(Error::ChainEmpty)?;
        Self::verify_genesis(genesis, key)
    }

    /// Append a note; returns its index
    ///
    /// All-or-nothing: if the repository write fails, the in-memory chain
    /// is left as it was.
    pub fn append(&mut self, note: NoteRecord) -> Result<u64> {
        let tail = self.blocks.last().ok_or(Error::ChainEmpty)?;
        let block = Block::create(tail.index() + 1, &Record::Note(note), tail.hash(), &self.key)?;

        self.repository.persist(&block)?;

        let index = block.index();
        debug!("Appended block {} ({})", index, short_hash(block.hash()));
        self.blocks.push(block);
        Ok(index)
    }

    /// Mark a block deleted; idempotent
    ///
    /// Genesis and indices past the tail are rejected.
    pub fn mark_deleted(&mut self, index: u64) -> Result<()> {
        self.check_note_index(index)?;
        if self.deleted.contains(&index) {
            return Ok(());
        }

        let mut next = self.deleted.clone();
        next.insert(index);
        self.repository.persist_deleted_indices(&next)?;
        self.deleted = next;

        debug!("Marked block {} deleted", index);
        Ok(())
    }

    /// Replace a note: delete the old index, append the new note
    ///
    /// The new note carries `updated_from = index`; the old block stays in
    /// the chain. Returns the new index.
    pub fn logical_update(&mut self, index: u64, note: NoteRecord) -> Result<u64> {
        self.check_note_index(index)?;
        if self.deleted.contains(&index) {
            return Err(Error::InvalidIndex {
                index,
                len: self.len(),
            });
        }

        self.mark_deleted(index)?;

        match self.append(note.with_updated_from(index)) {
            Ok(new_index) => Ok(new_index),
            Err(e) => {
                let mut restored = self.deleted.clone();
                restored.remove(&index);
                match self.repository.persist_deleted_indices(&restored) {
                    Ok(()) => self.deleted = restored,
                    Err(rollback) => warn!(
                        "Update of block {} failed and deletion could not be rolled back: {}",
                        index, rollback
                    ),
                }
                Err(e)
            }
        }
    }

    /// Decrypt one block's record; errors propagate
    pub fn read(&self, index: u64) -> Result<Record> {
        let block = self
            .repository
            .get(index)?
            .ok_or(Error::InvalidIndex {
                index,
                len: self.len(),
            })?;
        block.decrypt_record(&self.key)
    }

    /// Decrypt every non-deleted note in index order
    ///
    /// A block that cannot be read back, decrypted or decoded is logged and
    /// left out; one damaged block never hides the rest.
    pub fn list_active(&self) -> Result<Vec<ActiveEntry>> {
        let stored = self.repository.scan()?;
        let mut entries = Vec::new();

        for (index, block) in stored {
            if index == 0 || self.deleted.contains(&index) {
                continue;
            }
            let block = match block {
                Ok(block) => block,
                Err(e) => {
                    warn!("Skipping block {}: {}", index, e);
                    continue;
                }
            };
            match block.decrypt_record(&self.key) {
                Ok(Record::Note(note)) => entries.push(ActiveEntry {
                    index: block.index(),
                    timestamp: block.timestamp().to_string(),
                    note,
                }),
                Ok(Record::Genesis { .. }) => {
                    warn!("Skipping block {}: unexpected genesis record", block.index())
                }
                Err(e) => warn!("Skipping block {}: {}", block.index(), e),
            }
        }

        Ok(entries)
    }

    /// Walk the stored chain and report the first violation
    ///
    /// Never fails: storage errors are reported as a violation.
    pub fn validate_report(&self) -> ValidationReport {
        let blocks = match self.repository.all() {
            Ok(blocks) => blocks,
            Err(e) => {
                return ValidationReport::Invalid(ChainViolation::Unreadable {
                    reason: e.to_string(),
                })
            }
        };

        let report = if blocks.len() < self.blocks.len() {
            ValidationReport::Invalid(ChainViolation::Truncated {
                expected: self.len(),
                found: blocks.len() as u64,
            })
        } else {
            validate_blocks(&blocks, &self.deleted)
        };

        if let ValidationReport::Invalid(violation) = &report {
            warn!("Chain validation failed: {}", violation);
        }
        report
    }

    /// Whether the stored chain is intact
    pub fn validate(&self) -> bool {
        self.validate_report().is_valid()
    }

    fn check_note_index(&self, index: u64) -> Result<()> {
        if index == 0 || index >= self.len() {
            return Err(Error::InvalidIndex {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Always false once opened (genesis is present)
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block with the highest index
    pub fn tail(&self) -> Result<&Block> {
        self.blocks.last().ok_or(Error::ChainEmpty)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn deleted_indices(&self) -> &BTreeSet<u64> {
        &self.deleted
    }

    pub fn is_deleted(&self, index: u64) -> bool {
        self.deleted.contains(&index)
    }

    /// Number of notes not marked deleted
    pub fn active_count(&self) -> u64 {
        self.len().saturating_sub(1) - self.deleted.len() as u64
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Give the repository back, dropping the key
    pub fn into_repository(self) -> R {
        self.repository
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
