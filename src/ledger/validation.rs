//! Whole-chain integrity check
//!
//! Validation reports the first violation instead of failing: its job is to
//! detect corruption, not to stop on it.

use crate::ledger::{Block, ZERO_HASH};
use std::collections::BTreeSet;
use std::fmt;

/// First structural problem found in a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainViolation {
    /// No block at index 0
    MissingGenesis,
    /// Genesis has a non-zero previous hash or a bad hash
    GenesisMalformed { reason: String },
    /// Block at `position` carries a different index
    IndexMismatch { position: u64, found: u64 },
    /// Stored sequence is shorter than the unlocked chain
    Truncated { expected: u64, found: u64 },
    /// Recomputed hash differs from the stored one
    HashMismatch { index: u64 },
    /// `previous_hash` differs from the hash of block `index - 1`
    BrokenLink { index: u64 },
    /// Blocks could not be read back from storage
    Unreadable { reason: String },
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainViolation::MissingGenesis => write!(f, "genesis block missing"),
            ChainViolation::GenesisMalformed { reason } => {
                write!(f, "genesis block malformed: {}", reason)
            }
            ChainViolation::IndexMismatch { position, found } => {
                write!(f, "block at position {} has index {}", position, found)
            }
            ChainViolation::Truncated { expected, found } => {
                write!(f, "chain truncated: expected {} blocks, found {}", expected, found)
            }
            ChainViolation::HashMismatch { index } => write!(f, "block {} hash mismatch", index),
            ChainViolation::BrokenLink { index } => {
                write!(f, "block {} does not link to block {}", index, index.saturating_sub(1))
            }
            ChainViolation::Unreadable { reason } => write!(f, "chain unreadable: {}", reason),
        }
    }
}

/// Outcome of a validation walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReport {
    /// Every inspected block is intact
    Valid { checked: u64, skipped: u64 },
    /// First violation found
    Invalid(ChainViolation),
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationReport::Valid { .. })
    }

    pub fn violation(&self) -> Option<&ChainViolation> {
        match self {
            ValidationReport::Valid { .. } => None,
            ValidationReport::Invalid(violation) => Some(violation),
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReport::Valid { checked, skipped } => {
                write!(f, "valid ({} blocks checked, {} deleted skipped)", checked, skipped)
            }
            ValidationReport::Invalid(violation) => write!(f, "invalid: {}", violation),
        }
    }
}

/// Validate a block sequence ordered by index
///
/// Deleted blocks are not inspected themselves, but the block after one
/// must still link to its stored hash: the link always goes to the
/// physically preceding block.
pub fn validate_blocks(blocks: &[Block], deleted: &BTreeSet<u64>) -> ValidationReport {
    let genesis = match blocks.first() {
        Some(block) if block.index() == 0 => block,
        Some(block) => {
            return ValidationReport::Invalid(ChainViolation::IndexMismatch {
                position: 0,
                found: block.index(),
            })
        }
        None => return ValidationReport::Invalid(ChainViolation::MissingGenesis),
    };

    if genesis.previous_hash() != ZERO_HASH {
        return ValidationReport::Invalid(ChainViolation::GenesisMalformed {
            reason: "previous hash is not the zero sentinel".to_string(),
        });
    }
    if !genesis.verify_hash() {
        return ValidationReport::Invalid(ChainViolation::GenesisMalformed {
            reason: "hash mismatch".to_string(),
        });
    }

    let mut checked = 1;
    let mut skipped = 0;

    for (previous, block) in blocks.iter().zip(blocks.iter().skip(1)) {
        let expected_index = previous.index() + 1;
        if block.index() != expected_index {
            return ValidationReport::Invalid(ChainViolation::IndexMismatch {
                position: expected_index,
                found: block.index(),
            });
        }

        if deleted.contains(&block.index()) {
            skipped += 1;
            continue;
        }

        if !block.verify_hash() {
            return ValidationReport::Invalid(ChainViolation::HashMismatch {
                index: block.index(),
            });
        }
        if block.previous_hash() != previous.hash() {
            return ValidationReport::Invalid(ChainViolation::BrokenLink {
                index: block.index(),
            });
        }
        checked += 1;
    }

    ValidationReport::Valid { checked, skipped }
}
