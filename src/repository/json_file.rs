//! Single-file JSON block repository
//!
//! The whole chain lives in one human-readable file:
//! `{"blocks": [...], "deleted": [...]}`. Every write goes to a temporary
//! sibling first and is renamed into place, so a failed write leaves the
//! previous file untouched. Reads always parse the file again, so edits made
//! to it while a chain is open are seen by validation.

use crate::error::RepositoryError;
use crate::ledger::Block;
use crate::repository::{check_append, BlockRepository, RepoResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk layout
///
/// Blocks stay as raw JSON until asked for, so one malformed entry does not
/// make the others unreadable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChainFile {
    blocks: Vec<Value>,
    #[serde(default)]
    deleted: BTreeSet<u64>,
}

impl ChainFile {
    fn decode(value: &Value) -> RepoResult<Block> {
        Ok(Block::deserialize(value)?)
    }

    fn tail(&self) -> RepoResult<Option<Block>> {
        self.blocks.last().map(Self::decode).transpose()
    }

    fn decoded(&self) -> RepoResult<Vec<Block>> {
        self.blocks.iter().map(Self::decode).collect()
    }
}

/// Repository storing the chain in one JSON file
pub struct JsonFileRepository {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    lock: RwLock<()>,
}

impl JsonFileRepository {
    /// Open a chain file; a missing file is an empty chain
    pub fn open<P: AsRef<Path>>(path: P) -> RepoResult<Self> {
        let repo = JsonFileRepository {
            path: path.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        };

        let file = repo.read_file()?;
        info!(
            "Chain file {:?} opened, {} blocks",
            repo.path,
            file.blocks.len()
        );
        Ok(repo)
    }

    /// Path of the chain file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> RepoResult<ChainFile> {
        if !self.path.exists() {
            return Ok(ChainFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_atomic(&self, file: &ChainFile) -> RepoResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(file)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(content.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            RepositoryError::Io(e)
        })?;
        Ok(())
    }
}

impl BlockRepository for JsonFileRepository {
    fn tail(&self) -> RepoResult<Option<Block>> {
        let _guard = self.lock.read();
        self.read_file()?.tail()
    }

    fn get(&self, index: u64) -> RepoResult<Option<Block>> {
        let _guard = self.lock.read();
        let file = self.read_file()?;
        for value in &file.blocks {
            if value.get("index").and_then(Value::as_u64) == Some(index) {
                return ChainFile::decode(value).map(Some);
            }
        }
        Ok(None)
    }

    fn all(&self) -> RepoResult<Vec<Block>> {
        let _guard = self.lock.read();
        self.read_file()?.decoded()
    }

    fn scan(&self) -> RepoResult<Vec<(u64, RepoResult<Block>)>> {
        let _guard = self.lock.read();
        let file = self.read_file()?;
        Ok(file
            .blocks
            .iter()
            .enumerate()
            .map(|(position, value)| {
                let index = value
                    .get("index")
                    .and_then(Value::as_u64)
                    .unwrap_or(position as u64);
                (index, ChainFile::decode(value))
            })
            .collect())
    }

    fn persist(&self, block: &Block) -> RepoResult<()> {
        let _guard = self.lock.write();
        let mut file = self.read_file()?;
        check_append(file.tail()?.as_ref(), block)?;

        file.blocks.push(serde_json::to_value(block)?);
        self.write_atomic(&file)?;

        debug!("Persisted block {} to {:?}", block.index(), self.path);
        Ok(())
    }

    fn deleted_indices(&self) -> RepoResult<BTreeSet<u64>> {
        let _guard = self.lock.read();
        Ok(self.read_file()?.deleted)
    }

    fn persist_deleted_indices(&self, deleted: &BTreeSet<u64>) -> RepoResult<()> {
        let _guard = self.lock.write();
        let mut file = self.read_file()?;
        file.deleted = deleted.clone();
        self.write_atomic(&file)
    }
}
