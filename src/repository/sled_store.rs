//! Sled-based block repository
//!
//! Blocks live in their own tree keyed by big-endian index, so iteration
//! order is index order. The deleted-index record sits in a separate
//! metadata tree, outside any block.

use crate::error::RepositoryError;
use crate::ledger::Block;
use crate::repository::{check_append, BlockRepository, RepoResult};
use sled::{Db, IVec, Tree};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Key of the deleted-index record in the metadata tree
const DELETED_KEY: &[u8] = b"deleted_indices";

/// Durable repository backed by sled
pub struct SledRepository {
    /// Sled database
    db: Db,
    /// Blocks tree (index -> JSON block)
    blocks: Tree,
    /// Chain metadata tree
    meta: Tree,
}

impl SledRepository {
    /// Open or create a repository
    pub fn open<P: AsRef<Path>>(path: P) -> RepoResult<Self> {
        let db = sled::open(path.as_ref())?;
        let repo = Self::from_db(db)?;
        info!(
            "Block repository opened at {:?}, {} blocks",
            path.as_ref(),
            repo.blocks.len()
        );
        Ok(repo)
    }

    /// Create a temporary repository (for testing)
    pub fn in_memory() -> RepoResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> RepoResult<Self> {
        let blocks = db.open_tree("blocks")?;
        let meta = db.open_tree("chain_meta")?;
        Ok(SledRepository { db, blocks, meta })
    }

    /// Create block key from index
    fn block_key(index: u64) -> [u8; 8] {
        index.to_be_bytes()
    }

    /// Index encoded in a block key
    fn key_index(key: &IVec) -> RepoResult<u64> {
        let bytes = <[u8; 8]>::try_from(&key[..]).map_err(|_| {
            RepositoryError::Serialization(format!("invalid block key {:?}", key))
        })?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn decode_block(value: &IVec) -> RepoResult<Block> {
        Ok(serde_json::from_slice(value)?)
    }

    /// Insert a block, then make it durable with `flush`
    ///
    /// If `flush` fails the block is removed again, so the stored tail
    /// never runs ahead of what the caller was told.
    fn insert_block<F>(&self, block: &Block, flush: F) -> RepoResult<()>
    where
        F: FnOnce() -> RepoResult<()>,
    {
        let tail = self.tail()?;
        check_append(tail.as_ref(), block)?;

        let key = Self::block_key(block.index());
        let value = serde_json::to_vec(block)?;
        // Insert-if-absent: a concurrent writer cannot overwrite a block
        if self
            .blocks
            .compare_and_swap(key, None::<&[u8]>, Some(value.as_slice()))?
            .is_err()
        {
            return Err(RepositoryError::Conflict {
                expected: block.index() + 1,
                got: block.index(),
            });
        }

        if let Err(e) = flush() {
            match self
                .blocks
                .compare_and_swap(key, Some(value.as_slice()), None::<&[u8]>)
            {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    warn!("Block {} could not be removed after a failed flush", block.index())
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Replace the deleted-index record, restoring the old one if `flush` fails
    fn write_deleted<F>(&self, deleted: &BTreeSet<u64>, flush: F) -> RepoResult<()>
    where
        F: FnOnce() -> RepoResult<()>,
    {
        let value = serde_json::to_vec(deleted)?;
        let previous = self.meta.insert(DELETED_KEY, value)?;

        if let Err(e) = flush() {
            let restored = match previous {
                Some(old) => self.meta.insert(DELETED_KEY, old).map(|_| ()),
                None => self.meta.remove(DELETED_KEY).map(|_| ()),
            };
            if let Err(undo) = restored {
                warn!("Deleted indices could not be restored after a failed flush: {}", undo);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Flush to disk
    pub fn flush(&self) -> RepoResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl BlockRepository for SledRepository {
    fn tail(&self) -> RepoResult<Option<Block>> {
        match self.blocks.last()? {
            Some((_, value)) => Ok(Some(Self::decode_block(&value)?)),
            None => Ok(None),
        }
    }

    fn get(&self, index: u64) -> RepoResult<Option<Block>> {
        match self.blocks.get(Self::block_key(index))? {
            Some(value) => Ok(Some(Self::decode_block(&value)?)),
            None => Ok(None),
        }
    }

    fn all(&self) -> RepoResult<Vec<Block>> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for result in self.blocks.iter() {
            let (_, value) = result?;
            blocks.push(Self::decode_block(&value)?);
        }
        Ok(blocks)
    }

    fn scan(&self) -> RepoResult<Vec<(u64, RepoResult<Block>)>> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for result in self.blocks.iter() {
            let (key, value) = result?;
            blocks.push((Self::key_index(&key)?, Self::decode_block(&value)));
        }
        Ok(blocks)
    }

    fn persist(&self, block: &Block) -> RepoResult<()> {
        self.insert_block(block, || self.flush())?;

        debug!("Persisted block {}", block.index());
        Ok(())
    }

    fn deleted_indices(&self) -> RepoResult<BTreeSet<u64>> {
        match self.meta.get(DELETED_KEY)? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(BTreeSet::new()),
        }
    }

    fn persist_deleted_indices(&self, deleted: &BTreeSet<u64>) -> RepoResult<()> {
        self.write_deleted(deleted, || self.flush())
    }
}
