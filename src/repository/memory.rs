//! In-memory block repository

use crate::error::RepositoryError;
use crate::ledger::Block;
use crate::repository::{check_append, BlockRepository, RepoResult};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Volatile repository, mainly for tests and embedding
#[derive(Default)]
pub struct MemoryRepository {
    blocks: RwLock<Vec<Block>>,
    deleted: RwLock<BTreeSet<u64>>,
    /// Fail the next write with [`RepositoryError::Injected`]
    fail_next_write: AtomicBool,
}

impl MemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository over existing contents
    ///
    /// No checks are applied, so this can hold a damaged chain.
    pub fn from_parts(blocks: Vec<Block>, deleted: BTreeSet<u64>) -> Self {
        MemoryRepository {
            blocks: RwLock::new(blocks),
            deleted: RwLock::new(deleted),
            fail_next_write: AtomicBool::new(false),
        }
    }

    /// Make the next `persist` or `persist_deleted_indices` fail
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    fn take_injected_failure(&self) -> RepoResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Injected);
        }
        Ok(())
    }
}

impl BlockRepository for MemoryRepository {
    fn tail(&self) -> RepoResult<Option<Block>> {
        Ok(self.blocks.read().last().cloned())
    }

    fn get(&self, index: u64) -> RepoResult<Option<Block>> {
        Ok(self
            .blocks
            .read()
            .iter()
            .find(|b| b.index() == index)
            .cloned())
    }

    fn all(&self) -> RepoResult<Vec<Block>> {
        Ok(self.blocks.read().clone())
    }

    fn persist(&self, block: &Block) -> RepoResult<()> {
        let mut blocks = self.blocks.write();
        check_append(blocks.last(), block)?;
        self.take_injected_failure()?;
        blocks.push(block.clone());
        Ok(())
    }

    fn deleted_indices(&self) -> RepoResult<BTreeSet<u64>> {
        Ok(self.deleted.read().clone())
    }

    fn persist_deleted_indices(&self, deleted: &BTreeSet<u64>) -> RepoResult<()> {
        self.take_injected_failure()?;
        *self.deleted.write() = deleted.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{DerivedKey, KEY_SIZE};
    use crate::ledger::{NoteRecord, Record};

    fn key() -> DerivedKey {
        DerivedKey::from_bytes([9u8; KEY_SIZE])
    }

    #[test]
    fn test_persist_and_read() {
        let repo = MemoryRepository::new();
        assert!(repo.tail().unwrap().is_none());

        let genesis = Block::genesis(&key()).unwrap();
        repo.persist(&genesis).unwrap();

        assert_eq!(repo.tail().unwrap(), Some(genesis.clone()));
        assert_eq!(repo.get(0).unwrap(), Some(genesis));
        assert!(repo.get(1).unwrap().is_none());
    }

    #[test]
    fn test_out_of_sequence_rejected() {
        let repo = MemoryRepository::new();
        let block = Block::create(1, &Record::Note(NoteRecord::new("x")), "abc", &key()).unwrap();

        let result = repo.persist(&block);
        assert!(matches!(result, Err(RepositoryError::Conflict { expected: 0, got: 1 })));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_injected_failure_writes_nothing() {
        let repo = MemoryRepository::new();
        repo.fail_next_write();

        let genesis = Block::genesis(&key()).unwrap();
        assert!(matches!(repo.persist(&genesis), Err(RepositoryError::Injected)));
        assert!(repo.is_empty());

        // Only the next write fails
        repo.persist(&genesis).unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_deleted_indices() {
        let repo = MemoryRepository::new();
        let deleted: BTreeSet<u64> = [1, 3].into_iter().collect();

        repo.persist_deleted_indices(&deleted).unwrap();
        assert_eq!(repo.deleted_indices().unwrap(), deleted);
    }
}
