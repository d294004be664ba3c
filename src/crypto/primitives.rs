// src/crypto/primitives.rs
//! Low-level primitives: AES-256-GCM, X25519, SHA-256 and constant-time comparison.
//!
//! Nothing in here logs key material. Higher level operations live in the parent module.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use log::{error, trace};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use super::CryptoError;

/// The size of the AES key in bytes (256 bits)
pub const AES_KEY_SIZE: usize = 32;

/// The size of the nonce in bytes for AES-GCM (96 bits)
pub const AES_NONCE_SIZE: usize = 12;

/// The size of the GCM authentication tag in bytes
pub const AES_TAG_SIZE: usize = 16;

/// The size of an X25519 key in bytes
pub const X25519_KEY_SIZE: usize = 32;

/// Generate a fresh random nonce for AES-GCM
pub fn generate_nonce() -> [u8; AES_NONCE_SIZE] {
    let mut nonce = [0u8; AES_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    trace!("Generated {}-bit nonce", AES_NONCE_SIZE * 8);
    nonce
}

/// Check that key material is exactly 32 bytes and copy it out
pub fn normalize_key(key: &[u8]) -> Result<[u8; AES_KEY_SIZE], CryptoError> {
    <[u8; AES_KEY_SIZE]>::try_from(key).map_err(|_| {
        error!("Invalid key size: {} (expected {} bytes)", key.len(), AES_KEY_SIZE);
        CryptoError::InvalidKey(format!(
            "key must be {} bytes, got {}",
            AES_KEY_SIZE,
            key.len()
        ))
    })
}

/// Encrypt with AES-256-GCM under a fresh nonce, returning `nonce || ciphertext || tag`
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = normalize_key(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let nonce_bytes = generate_nonce();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| {
            error!("AES-GCM encryption failed: {}", e);
            CryptoError::Encryption(format!("AES-GCM encryption failed: {}", e))
        })?;

    let mut output = Vec::with_capacity(AES_NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    trace!("Sealed {} plaintext bytes into {} bytes", plaintext.len(), output.len());
    Ok(output)
}

/// Inverse of [`seal`]: split the nonce off the front, then decrypt and verify
pub fn open(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = normalize_key(key).map_err(|e| CryptoError::Decryption(e.to_string()))?;

    if sealed.len() < AES_NONCE_SIZE + AES_TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "payload too short: {} bytes",
            sealed.len()
        )));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(AES_NONCE_SIZE);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::Decryption(format!("Failed to create cipher: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            error!("AES-GCM authentication failed for {} byte payload", sealed.len());
            CryptoError::Decryption("authentication tag mismatch".to_string())
        })
}

/// Calculate a SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    trace!("Calculating SHA-256 hash of {} bytes of data", data.len());
    Sha256::digest(data).into()
}

/// Securely compare two byte arrays in constant time
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Generate an X25519 key pair, returned as `(secret, public)`
pub fn generate_x25519_keypair() -> ([u8; X25519_KEY_SIZE], [u8; X25519_KEY_SIZE]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    trace!("Generated X25519 key pair, public key {}", hex::encode(public.as_bytes()));
    (secret.to_bytes(), public.to_bytes())
}

/// Derive the X25519 public key belonging to a secret key
pub fn x25519_public_from_secret(secret: &[u8; X25519_KEY_SIZE]) -> [u8; X25519_KEY_SIZE] {
    PublicKey::from(&StaticSecret::from(*secret)).to_bytes()
}

/// Perform a Diffie-Hellman key exchange with X25519
pub fn x25519_diffie_hellman(
    secret_key: &[u8],
    public_key: &[u8],
) -> Result<[u8; X25519_KEY_SIZE], CryptoError> {
    let secret: [u8; X25519_KEY_SIZE] = secret_key.try_into().map_err(|_| {
        error!("Invalid X25519 secret key length: {}", secret_key.len());
        CryptoError::InvalidKey(format!("secret key length {}", secret_key.len()))
    })?;
    let public: [u8; X25519_KEY_SIZE] = public_key.try_into().map_err(|_| {
        error!("Invalid X25519 public key length: {}", public_key.len());
        CryptoError::InvalidKey(format!("public key length {}", public_key.len()))
    })?;

    let shared = StaticSecret::from(secret).diffie_hellman(&PublicKey::from(public));
    Ok(shared.to_bytes())
}
