//! AES-256-GCM Encryption Implementation
//!
//! Every payload is sealed under a fresh random nonce and packed into one
//! self-contained blob: `base64(nonce ‖ tag ‖ ciphertext)`. Storage layers
//! treat the blob as plain text.

use crate::crypto::{DerivedKey, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Authenticated ciphertext blob, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedPayload(String);

impl EncryptedPayload {
    /// Wrap a stored base64 string; validity is checked on decryption
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        EncryptedPayload(encoded.into())
    }

    /// The exact stored string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn pack(nonce: &[u8; NONCE_SIZE], tag: &[u8], ciphertext: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + ciphertext.len());
        bytes.extend_from_slice(nonce);
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(ciphertext);
        EncryptedPayload(B64.encode(bytes))
    }

    /// Split into (nonce, tag, ciphertext) at fixed offsets
    fn unpack(&self) -> Result<([u8; NONCE_SIZE], Vec<u8>, Vec<u8>)> {
        let bytes = B64.decode(&self.0).map_err(|e| {
            debug!("Payload is not valid base64: {}", e);
            Error::Authentication
        })?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            debug!("Payload truncated: {} bytes", bytes.len());
            return Err(Error::Authentication);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        let tag = bytes[NONCE_SIZE..NONCE_SIZE + TAG_SIZE].to_vec();
        let ciphertext = bytes[NONCE_SIZE + TAG_SIZE..].to_vec();

        Ok((nonce, tag, ciphertext))
    }
}

fn cipher_key(key: &DerivedKey) -> Result<LessSafeKey> {
    let unbound_key = UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map_err(|_| Error::Encryption("Failed to create cipher key".to_string()))?;
    Ok(LessSafeKey::new(unbound_key))
}

/// Encrypt a payload under a fresh random nonce
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> Result<EncryptedPayload> {
    let sealing_key = cipher_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::Encryption("Encryption failed".to_string()))?;

    Ok(EncryptedPayload::pack(&nonce_bytes, tag.as_ref(), &in_out))
}

/// Decrypt and verify a payload
///
/// A wrong key, a tampered blob and a truncated blob all fail with
/// [`Error::Authentication`].
pub fn decrypt(key: &DerivedKey, payload: &EncryptedPayload) -> Result<Vec<u8>> {
    let (nonce_bytes, tag, ciphertext) = payload.unpack()?;
    let opening_key = cipher_key(key)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    // ring expects ciphertext ‖ tag
    let mut in_out = ciphertext;
    in_out.extend_from_slice(&tag);

    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::Authentication)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_SIZE;
    use proptest::prelude::*;

    fn test_key() -> DerivedKey {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        DerivedKey::from_bytes(key)
    }

    fn raw_bytes(payload: &EncryptedPayload) -> Vec<u8> {
        B64.decode(payload.as_str()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = test_key();
        let plaintext = b"Hello, diary!";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_blob_layout() {
        let key = test_key();
        let plaintext = b"layout";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let bytes = raw_bytes(&encrypted);

        assert_eq!(bytes.len(), NONCE_SIZE + TAG_SIZE + plaintext.len());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = test_key();

        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();

        assert_ne!(a, b);
        assert_ne!(raw_bytes(&a)[..NONCE_SIZE], raw_bytes(&b)[..NONCE_SIZE]);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = test_key();
        let key2 = test_key();

        let encrypted = encrypt(&key1, b"Secret data").unwrap();
        let result = decrypt(&key2, &encrypted);

        assert!(matches!(result, Err(Error::Authentication)));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = test_key();
        let mut bytes = raw_bytes(&encrypt(&key, b"Secret data").unwrap());
        bytes[NONCE_SIZE] ^= 0x01;

        let tampered = EncryptedPayload::from_base64(B64.encode(bytes));
        assert!(matches!(decrypt(&key, &tampered), Err(Error::Authentication)));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let key = test_key();
        let bytes = raw_bytes(&encrypt(&key, b"Secret data").unwrap());

        let truncated = EncryptedPayload::from_base64(B64.encode(&bytes[..NONCE_SIZE + 4]));
        assert!(matches!(decrypt(&key, &truncated), Err(Error::Authentication)));

        let short_body = EncryptedPayload::from_base64(B64.encode(&bytes[..bytes.len() - 1]));
        assert!(matches!(decrypt(&key, &short_body), Err(Error::Authentication)));
    }

    #[test]
    fn test_invalid_base64_fails() {
        let key = test_key();
        let garbage = EncryptedPayload::from_base64("not base64 at all!");

        assert!(matches!(decrypt(&key, &garbage), Err(Error::Authentication)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();

        let encrypted = encrypt(&key, b"").unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let key = test_key();
        let encrypted = encrypt(&key, b"text").unwrap();

        let json = serde_json::to_string(&encrypted).unwrap();
        assert_eq!(json, format!("\"{}\"", encrypted.as_str()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_round_trip(
            key in any::<[u8; KEY_SIZE]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let key = DerivedKey::from_bytes(key);
            let encrypted = encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
        }

        #[test]
        fn prop_single_bit_flip_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 1..256),
            bit in any::<usize>(),
        ) {
            let key = test_key();
            let mut bytes = raw_bytes(&encrypt(&key, &plaintext).unwrap());
            let bit = bit % (bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);

            let tampered = EncryptedPayload::from_base64(B64.encode(bytes));
            prop_assert!(matches!(decrypt(&key, &tampered), Err(Error::Authentication)));
        }
    }
}
