//! Immutable ledger block
//!
//! The block hash covers `index ‖ timestamp ‖ encrypted_data ‖ previous_hash`
//! as their stored string forms, with no separators. Because the encrypted
//! payload (not the plaintext) is hashed, verification never needs a key.

use crate::crypto::{decrypt, encrypt, DerivedKey, EncryptedPayload};
use crate::error::{Error, Result};
use crate::ledger::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};

/// Length of a hex-encoded block hash
pub const HASH_HEX_LEN: usize = 64;

/// `previous_hash` of the genesis block
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A ledger block, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    /// ISO-8601 creation time; this exact string is hashed
    timestamp: String,
    encrypted_data: EncryptedPayload,
    previous_hash: String,
    hash: String,
}

impl Block {
    /// Build a block: encrypt the record, stamp the time, compute the hash
    pub fn create(
        index: u64,
        record: &Record,
        previous_hash: &str,
        key: &DerivedKey,
    ) -> Result<Self> {
        let plaintext = record.to_bytes()?;
        let encrypted_data = encrypt(key, &plaintext)?;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let hash = Self::compute_hash(index, &timestamp, &encrypted_data, previous_hash);

        Ok(Block {
            index,
            timestamp,
            encrypted_data,
            previous_hash: previous_hash.to_string(),
            hash,
        })
    }

    /// Build the genesis block
    pub fn genesis(key: &DerivedKey) -> Result<Self> {
        Self::create(0, &Record::genesis(), ZERO_HASH, key)
    }

    /// Hash the four content fields
    pub fn compute_hash(
        index: u64,
        timestamp: &str,
        encrypted_data: &EncryptedPayload,
        previous_hash: &str,
    ) -> String {
        let mut context = Context::new(&SHA256);
        context.update(index.to_string().as_bytes());
        context.update(timestamp.as_bytes());
        context.update(encrypted_data.as_str().as_bytes());
        context.update(previous_hash.as_bytes());
        hex::encode(context.finish().as_ref())
    }

    /// Recompute the hash from stored fields and compare
    pub fn verify_hash(&self) -> bool {
        Self::compute_hash(
            self.index,
            &self.timestamp,
            &self.encrypted_data,
            &self.previous_hash,
        ) == self.hash
    }

    /// Decrypt and decode the payload
    ///
    /// Index 0 must hold the genesis record and every other index a note.
    pub fn decrypt_record(&self, key: &DerivedKey) -> Result<Record> {
        let plaintext = decrypt(key, &self.encrypted_data)?;
        let record = Record::from_bytes(&plaintext)?;

        match (&record, self.is_genesis()) {
            (Record::Genesis { .. }, true) | (Record::Note(_), false) => Ok(record),
            (Record::Genesis { .. }, false) => Err(Error::Decode(format!(
                "genesis record found at index {}",
                self.index
            ))),
            (Record::Note(_), true) => Err(Error::Decode(
                "note record found at genesis index".to_string(),
            )),
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Parse the stored timestamp
    pub fn created_at(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::Decode(format!("Invalid block timestamp: {}", e)))
    }

    pub fn encrypted_data(&self) -> &EncryptedPayload {
        &self.encrypted_data
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_SIZE;
    use crate::ledger::NoteRecord;

    fn test_key() -> DerivedKey {
        DerivedKey::from_bytes([0x11; KEY_SIZE])
    }

    #[test]
    fn test_genesis_shape() {
        let genesis = Block::genesis(&test_key()).unwrap();

        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.previous_hash(), ZERO_HASH);
        assert_eq!(genesis.hash().len(), HASH_HEX_LEN);
        assert!(genesis.verify_hash());
        assert!(genesis.decrypt_record(&test_key()).unwrap().is_genesis_sentinel());
    }

    #[test]
    fn test_hash_input_is_plain_concatenation() {
        let payload = EncryptedPayload::from_base64("QUJD");
        let hash = Block::compute_hash(7, "2024-01-01T00:00:00.000000Z", &payload, ZERO_HASH);

        let expected = crate::ledger::sha256_hex(
            format!("7{}{}{}", "2024-01-01T00:00:00.000000Z", "QUJD", ZERO_HASH).as_bytes(),
        );
        assert_eq!(hash, expected);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_create_links_previous_hash() {
        let key = test_key();
        let genesis = Block::genesis(&key).unwrap();
        let block = Block::create(
            1,
            &Record::Note(NoteRecord::new("hello")),
            genesis.hash(),
            &key,
        )
        .unwrap();

        assert_eq!(block.previous_hash(), genesis.hash());
        assert!(block.verify_hash());
        assert!(block.created_at().is_ok());
    }

    #[test]
    fn test_verify_hash_without_key() {
        let block = Block::genesis(&test_key()).unwrap();

        // Round-trip through the persisted form, no key involved
        let json = serde_json::to_string(&block).unwrap();
        let restored: Block = serde_json::from_str(&json).unwrap();
        assert!(restored.verify_hash());
    }

    #[test]
    fn test_persisted_shape() {
        let block = Block::genesis(&test_key()).unwrap();
        let value = serde_json::to_value(&block).unwrap();

        assert!(value["index"].is_u64());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(value["encrypted_data"].is_string());
        assert_eq!(value["previous_hash"].as_str().unwrap(), ZERO_HASH);
        assert_eq!(value["hash"].as_str().unwrap(), block.hash());
    }

    #[test]
    fn test_tampered_fields_fail_verification() {
        let block = Block::genesis(&test_key()).unwrap();
        let original = serde_json::to_value(&block).unwrap();

        for field in ["timestamp", "encrypted_data", "previous_hash"] {
            let mut value = original.clone();
            let mut text = value[field].as_str().unwrap().to_string();
            let first = text.remove(0);
            text.insert(0, if first == 'A' { 'B' } else { 'A' });
            value[field] = serde_json::Value::String(text);

            let tampered: Block = serde_json::from_value(value).unwrap();
            assert!(!tampered.verify_hash(), "{} change not detected", field);
        }

        let mut value = original;
        value["index"] = serde_json::json!(5);
        let tampered: Block = serde_json::from_value(value).unwrap();
        assert!(!tampered.verify_hash());
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let block = Block::genesis(&test_key()).unwrap();
        let wrong = DerivedKey::from_bytes([0x22; KEY_SIZE]);

        assert!(matches!(block.decrypt_record(&wrong), Err(Error::Authentication)));
    }

    #[test]
    fn test_record_kind_must_match_index() {
        let key = test_key();

        let misplaced_genesis = Block::create(3, &Record::genesis(), ZERO_HASH, &key).unwrap();
        assert!(matches!(misplaced_genesis.decrypt_record(&key), Err(Error::Decode(_))));

        let misplaced_note = Block::create(
            0,
            &Record::Note(NoteRecord::new("x")),
            ZERO_HASH,
            &key,
        )
        .unwrap();
        assert!(matches!(misplaced_note.decrypt_record(&key), Err(Error::Decode(_))));
    }
}
