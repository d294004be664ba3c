// src/payload.rs
//! On-chain message content encoding
//!
//! The `content` bytes of a message object take one of four forms:
//!
//! - plain UTF-8 text
//! - `enc:v1:<base64(nonce || ciphertext)>`, text encrypted with the conversation's shared key
//! - `blob:<blobId>`, the UTF-8 text lives off-chain in blob storage
//! - `blob+enc:<blobId>`, the off-chain bytes are an encrypted file payload

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};
use thiserror::Error;

use crate::crypto::{self, CryptoError, SharedKey};
use crate::models::Address;
use crate::storage::tiered::TieredBlobStore;
use crate::storage::StorageError;

pub const ENCRYPTED_PREFIX: &str = "enc:v1:";
pub const BLOB_PREFIX: &str = "blob:";
pub const ENCRYPTED_BLOB_PREFIX: &str = "blob+enc:";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Content is not valid UTF-8")]
    InvalidUtf8,

    #[error("Content is encrypted but no shared key is available")]
    MissingKey,

    #[error("Content references blob {0} but no blob store is configured")]
    NoBlobStore(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A parsed content field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Plain(String),
    /// Base64 of nonce || ciphertext
    Encrypted(String),
    Blob(String),
    EncryptedBlob(String),
}

impl Payload {
    pub fn parse(content: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(content).map_err(|_| PayloadError::InvalidUtf8)?;

        let payload = if let Some(rest) = text.strip_prefix(ENCRYPTED_BLOB_PREFIX) {
            Payload::EncryptedBlob(rest.to_string())
        } else if let Some(rest) = text.strip_prefix(BLOB_PREFIX) {
            Payload::Blob(rest.to_string())
        } else if let Some(rest) = text.strip_prefix(ENCRYPTED_PREFIX) {
            Payload::Encrypted(rest.to_string())
        } else {
            Payload::Plain(text.to_string())
        };
        Ok(payload)
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Payload::Plain(text) => text.as_bytes().to_vec(),
            Payload::Encrypted(b64) => format!("{}{}", ENCRYPTED_PREFIX, b64).into_bytes(),
            Payload::Blob(id) => format!("{}{}", BLOB_PREFIX, id).into_bytes(),
            Payload::EncryptedBlob(id) => format!("{}{}", ENCRYPTED_BLOB_PREFIX, id).into_bytes(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Payload::Encrypted(_) | Payload::EncryptedBlob(_))
    }
}

/// Shared keys per peer for the connected account
#[derive(Debug, Default, Clone)]
pub struct KeyRing {
    keys: HashMap<Address, SharedKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, peer: Address, key: SharedKey) -> Option<SharedKey> {
        self.keys.insert(peer, key)
    }

    pub fn get(&self, peer: &Address) -> Option<&SharedKey> {
        self.keys.get(peer)
    }

    pub fn remove(&mut self, peer: &Address) -> Option<SharedKey> {
        self.keys.remove(peer)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Turns content bytes into display text, fetching and decrypting as needed
#[derive(Clone, Default)]
pub struct PayloadDecoder {
    blobs: Option<Arc<TieredBlobStore>>,
}

impl PayloadDecoder {
    pub fn new(blobs: Option<Arc<TieredBlobStore>>) -> Self {
        Self { blobs }
    }

    pub async fn decode(&self, content: &[u8], key: Option<&SharedKey>) -> Result<String, PayloadError> {
        match Payload::parse(content)? {
            Payload::Plain(text) => Ok(text),
            Payload::Encrypted(b64) => {
                let key = key.ok_or(PayloadError::MissingKey)?;
                trace!("Decrypting inline payload of {} chars", b64.len());
                Ok(crypto::decrypt_message(&b64, key.as_ref())?)
            }
            Payload::Blob(blob_id) => {
                let bytes = self.fetch_blob(&blob_id).await?;
                String::from_utf8(bytes).map_err(|_| PayloadError::InvalidUtf8)
            }
            Payload::EncryptedBlob(blob_id) => {
                // Check the key before going to the network
                let key = key.ok_or(PayloadError::MissingKey)?;
                let sealed = self.fetch_blob(&blob_id).await?;
                let bytes = crypto::decrypt_file(&sealed, key.as_ref())?;
                String::from_utf8(bytes).map_err(|_| PayloadError::InvalidUtf8)
            }
        }
    }

    async fn fetch_blob(&self, blob_id: &str) -> Result<Vec<u8>, PayloadError> {
        let store = self
            .blobs
            .as_ref()
            .ok_or_else(|| PayloadError::NoBlobStore(blob_id.to_string()))?;
        debug!("Resolving off-chain content {}", blob_id);
        Ok(store.retrieve(blob_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SharedKey {
        SharedKey::from_bytes([7u8; 32])
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(Payload::parse(b"hello").unwrap(), Payload::Plain("hello".to_string()));
        assert_eq!(
            Payload::parse(b"enc:v1:AAAA").unwrap(),
            Payload::Encrypted("AAAA".to_string())
        );
        assert_eq!(Payload::parse(b"blob:xyz").unwrap(), Payload::Blob("xyz".to_string()));
        assert_eq!(
            Payload::parse(b"blob+enc:xyz").unwrap(),
            Payload::EncryptedBlob("xyz".to_string())
        );
        assert!(matches!(Payload::parse(&[0xff, 0xfe]), Err(PayloadError::InvalidUtf8)));
    }

    #[test]
    fn test_encode_restores_prefix() {
        let payload = Payload::EncryptedBlob("abc".to_string());
        assert_eq!(payload.encode(), b"blob+enc:abc".to_vec());
        assert!(payload.is_encrypted());
        assert!(!Payload::Blob("abc".to_string()).is_encrypted());
    }

    #[tokio::test]
    async fn test_decode_plain_and_encrypted() {
        let decoder = PayloadDecoder::default();
        assert_eq!(decoder.decode(b"hi", None).await.unwrap(), "hi");

        let ciphertext = crypto::encrypt_message("secret", key().as_ref()).unwrap();
        let content = Payload::Encrypted(ciphertext).encode();
        assert_eq!(decoder.decode(&content, Some(&key())).await.unwrap(), "secret");

        assert!(matches!(
            decoder.decode(&content, None).await,
            Err(PayloadError::MissingKey)
        ));

        let wrong = SharedKey::from_bytes([8u8; 32]);
        assert!(matches!(
            decoder.decode(&content, Some(&wrong)).await,
            Err(PayloadError::Crypto(CryptoError::Decryption(_)))
        ));
    }

    #[tokio::test]
    async fn test_blob_without_store() {
        let decoder = PayloadDecoder::default();
        assert!(matches!(
            decoder.decode(b"blob:abc", None).await,
            Err(PayloadError::NoBlobStore(id)) if id == "abc"
        ));
    }

    #[test]
    fn test_key_ring() {
        let peer = Address::parse(&format!("0x{}", "b".repeat(64))).unwrap();
        let mut ring = KeyRing::new();
        assert!(ring.is_empty());
        ring.insert(peer.clone(), key());
        assert_eq!(ring.get(&peer), Some(&key()));
        assert_eq!(ring.len(), 1);
        ring.remove(&peer);
        assert!(ring.get(&peer).is_none());
    }
}
