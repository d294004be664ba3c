// src/crypto/mod.rs
//! End-to-end payload encryption
//!
//! Key agreement is X25519. The raw shared secret is hashed with SHA-256 into a 256-bit key,
//! and payloads are sealed with AES-256-GCM as `nonce || ciphertext || tag`. Text messages
//! are additionally base64 encoded so they can be stored as on-chain content.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{debug, error};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::Address;

pub mod keystore;
pub mod primitives;

use primitives::X25519_KEY_SIZE;

/// Domain separation for [`generate_conversation_key`]
pub const CONVERSATION_KEY_DOMAIN: &str = "chainpost-conversation-key-v1";

/// Errors related to cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Sealing a payload failed, usually because the key is malformed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Authentication failed or the payload is malformed
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Key material has the wrong size or encoding
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// An X25519 key pair. Generated locally and never transmitted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    pub public_key: [u8; X25519_KEY_SIZE],
    pub secret_key: [u8; X25519_KEY_SIZE],
}

impl KeyPair {
    /// Rebuild a key pair from a stored secret key
    pub fn from_secret(secret_key: [u8; X25519_KEY_SIZE]) -> Self {
        Self {
            public_key: primitives::x25519_public_from_secret(&secret_key),
            secret_key,
        }
    }

    pub fn public_key_base64(&self) -> String {
        export_public_key(&self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Symmetric 256-bit key shared by two parties.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for SharedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

/// Generate a fresh key pair from the OS random source
pub fn generate_key_pair() -> KeyPair {
    let (secret_key, public_key) = primitives::generate_x25519_keypair();
    debug!("Generated key pair {}", hex::encode(public_key));
    KeyPair {
        public_key,
        secret_key,
    }
}

/// Derive the key shared with a peer: `SHA-256(X25519(my_secret, their_public))`.
///
/// Both sides obtain the same key: `derive(a.secret, b.public) == derive(b.secret, a.public)`.
pub fn derive_shared_key(my_secret_key: &[u8], their_public_key: &[u8]) -> Result<SharedKey, CryptoError> {
    let mut raw = primitives::x25519_diffie_hellman(my_secret_key, their_public_key)?;
    let key = SharedKey(primitives::sha256(&raw));
    raw.zeroize();
    Ok(key)
}

/// Encrypt a text message, returning base64 of `nonce || ciphertext || tag`
pub fn encrypt_message(plaintext: &str, key: &[u8]) -> Result<String, CryptoError> {
    let sealed = primitives::seal(key, plaintext.as_bytes())?;
    Ok(BASE64.encode(sealed))
}

/// Decrypt a message produced by [`encrypt_message`].
///
/// Any tampering, truncation or wrong key yields [`CryptoError::Decryption`].
pub fn decrypt_message(ciphertext_base64: &str, key: &[u8]) -> Result<String, CryptoError> {
    let sealed = BASE64.decode(ciphertext_base64.trim()).map_err(|e| {
        error!("Encrypted message is not valid base64: {}", e);
        CryptoError::Decryption(format!("invalid base64: {}", e))
    })?;

    let plaintext = primitives::open(key, &sealed)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Decryption(format!("decrypted message is not UTF-8: {}", e)))
}

/// Encrypt a binary payload such as an attachment
pub fn encrypt_file(data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    primitives::seal(key, data)
}

/// Decrypt a binary payload produced by [`encrypt_file`]
pub fn decrypt_file(sealed: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    primitives::open(key, sealed)
}

/// Deterministic key for a pair of addresses, independent of argument order.
///
/// Used for metadata tagging only; message payloads use [`derive_shared_key`].
pub fn generate_conversation_key(address_a: &str, address_b: &str) -> [u8; 32] {
    let (first, second) = if address_a <= address_b {
        (address_a, address_b)
    } else {
        (address_b, address_a)
    };

    let material = format!("{}:{}:{}", first, second, CONVERSATION_KEY_DOMAIN);
    primitives::sha256(material.as_bytes())
}

/// Convenience wrapper over [`generate_conversation_key`] for parsed addresses
pub fn conversation_key_for(a: &Address, b: &Address) -> [u8; 32] {
    generate_conversation_key(a.as_str(), b.as_str())
}

/// Hex SHA-256 of a message, for tamper evidence
pub fn hash_message(message: &str) -> String {
    hex::encode(primitives::sha256(message.as_bytes()))
}

/// Recompute the hash of `message` and compare it with `expected_hash` in constant time
pub fn verify_message_integrity(message: &str, expected_hash: &str) -> bool {
    match hex::decode(expected_hash.trim()) {
        Ok(expected) => primitives::secure_compare(&primitives::sha256(message.as_bytes()), &expected),
        Err(_) => false,
    }
}

/// Encode a public key for publication
pub fn export_public_key(public_key: &[u8; X25519_KEY_SIZE]) -> String {
    BASE64.encode(public_key)
}

/// Decode a published public key
pub fn import_public_key(encoded: &str) -> Result<[u8; X25519_KEY_SIZE], CryptoError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("invalid base64 public key: {}", e)))?;

    <[u8; X25519_KEY_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| CryptoError::InvalidKey(format!("public key must be 32 bytes, got {}", bytes.len())))
}
