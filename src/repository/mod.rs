//! Block repository
//!
//! Durable storage of blocks keyed by index, plus the chain-level
//! deleted-index record. The ledger only relies on this narrow trait and
//! never assumes a storage technology.

mod json_file;
mod memory;
mod sled_store;

pub use json_file::JsonFileRepository;
pub use memory::MemoryRepository;
pub use sled_store::SledRepository;

use crate::error::RepositoryError;
use crate::ledger::Block;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result type for repository operations
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Storage collaborator for the chain
///
/// `persist` must reject a block whose index is not exactly one past the
/// current tail (0 when empty). A failed write leaves no trace: the tail
/// is unchanged and persisting the same block again succeeds.
pub trait BlockRepository: Send + Sync {
    /// Block with the highest index, if any
    fn tail(&self) -> RepoResult<Option<Block>>;

    /// Block at `index`
    fn get(&self, index: u64) -> RepoResult<Option<Block>>;

    /// All blocks by ascending index
    fn all(&self) -> RepoResult<Vec<Block>>;

    /// All stored blocks by ascending index, each decoded on its own
    ///
    /// A damaged stored value yields an error for that index only, so a
    /// reader can skip it and keep the rest.
    fn scan(&self) -> RepoResult<Vec<(u64, RepoResult<Block>)>> {
        Ok(self.all()?.into_iter().map(|b| (b.index(), Ok(b))).collect())
    }

    /// Append a block
    fn persist(&self, block: &Block) -> RepoResult<()>;

    /// Indices logically marked deleted
    fn deleted_indices(&self) -> RepoResult<BTreeSet<u64>>;

    /// Replace the deleted-index record
    fn persist_deleted_indices(&self, deleted: &BTreeSet<u64>) -> RepoResult<()>;
}

/// Index the next appended block must carry
pub(crate) fn next_index(tail: Option<&Block>) -> u64 {
    tail.map(|b| b.index() + 1).unwrap_or(0)
}

/// Reject out-of-sequence appends
pub(crate) fn check_append(tail: Option<&Block>, block: &Block) -> RepoResult<()> {
    let expected = next_index(tail);
    if block.index() != expected {
        return Err(RepositoryError::Conflict {
            expected,
            got: block.index(),
        });
    }
    Ok(())
}

impl<R: BlockRepository + ?Sized> BlockRepository for Box<R> {
    fn tail(&self) -> RepoResult<Option<Block>> {
        (**self).tail()
    }

    fn get(&self, index: u64) -> RepoResult<Option<Block>> {
        (**self).get(index)
    }

    fn all(&self) -> RepoResult<Vec<Block>> {
        (**self).all()
    }

    fn scan(&self) -> RepoResult<Vec<(u64, RepoResult<Block>)>> {
        (**self).scan()
    }

    fn persist(&self, block: &Block) -> RepoResult<()> {
        (**self).persist(block)
    }

    fn deleted_indices(&self) -> RepoResult<BTreeSet<u64>> {
        (**self).deleted_indices()
    }

    fn persist_deleted_indices(&self, deleted: &BTreeSet<u64>) -> RepoResult<()> {
        (**self).persist_deleted_indices(deleted)
    }
}

impl<R: BlockRepository + ?Sized> BlockRepository for Arc<R> {
    fn tail(&self) -> RepoResult<Option<Block>> {
        (**self).tail()
    }

    fn get(&self, index: u64) -> RepoResult<Option<Block>> {
        (**self).get(index)
    }

    fn all(&self) -> RepoResult<Vec<Block>> {
        (**self).all()
    }

    fn scan(&self) -> RepoResult<Vec<(u64, RepoResult<Block>)>> {
        (**self).scan()
    }

    fn persist(&self, block: &Block) -> RepoResult<()> {
        (**self).persist(block)
    }

    fn deleted_indices(&self) -> RepoResult<BTreeSet<u64>> {
        (**self).deleted_indices()
    }

    fn persist_deleted_indices(&self, deleted: &BTreeSet<u64>) -> RepoResult<()> {
        (**self).persist_deleted_indices(deleted)
    }
}
