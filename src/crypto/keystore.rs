// src/crypto/keystore.rs
//! Local persistence of the encryption key pair
//!
//! The key pair lives in the same local store as the user preferences, one entry per account.
//! It is written base64 encoded and never leaves the device.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{info, warn};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::{self, derive_shared_key, CryptoError, KeyPair, SharedKey};
use crate::models::Address;
use crate::preferences::{PreferenceError, PreferenceStore};

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Preference store error: {0}")]
    Store(#[from] PreferenceError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

fn secret_key_entry(owner: &Address) -> String {
    format!("keypair:{}:secret", owner)
}

pub struct KeyStore {
    store: Arc<dyn PreferenceStore>,
}

impl KeyStore {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Load the stored key pair for `owner`, if one exists and is readable
    pub fn load(&self, owner: &Address) -> Result<Option<KeyPair>, KeyStoreError> {
        let Some(mut encoded) = self.store.get(&secret_key_entry(owner))? else {
            return Ok(None);
        };

        let decoded = BASE64.decode(encoded.trim());
        encoded.zeroize();

        match decoded {
            Ok(mut bytes) => {
                let pair = <[u8; 32]>::try_from(bytes.as_slice()).ok().map(KeyPair::from_secret);
                bytes.zeroize();
                if pair.is_none() {
                    warn!("Stored secret key for {} has the wrong length", owner);
                }
                Ok(pair)
            }
            Err(e) => {
                warn!("Stored secret key for {} is not valid base64: {}", owner, e);
                Ok(None)
            }
        }
    }

    /// Load the key pair for `owner`, generating and saving a new one when none is stored.
    ///
    /// Returns the pair and whether it was newly generated.
    pub fn load_or_generate(&self, owner: &Address) -> Result<(KeyPair, bool), KeyStoreError> {
        if let Some(pair) = self.load(owner)? {
            return Ok((pair, false));
        }

        let pair = crypto::generate_key_pair();
        self.save(owner, &pair)?;
        info!("Generated new encryption key pair for {}", owner);
        Ok((pair, true))
    }

    pub fn save(&self, owner: &Address, pair: &KeyPair) -> Result<(), KeyStoreError> {
        let mut encoded = BASE64.encode(pair.secret_key);
        let result = self.store.set(&secret_key_entry(owner), &encoded);
        encoded.zeroize();
        Ok(result?)
    }

    pub fn remove(&self, owner: &Address) -> Result<(), KeyStoreError> {
        Ok(self.store.remove(&secret_key_entry(owner))?)
    }

    /// Derive the key shared with a peer whose public key was published as base64
    pub fn shared_key_with(
        &self,
        owner: &Address,
        peer_public_key_base64: &str,
    ) -> Result<Option<SharedKey>, KeyStoreError> {
        let Some(pair) = self.load(owner)? else {
            return Ok(None);
        };
        let peer_public = crypto::import_public_key(peer_public_key_base64)?;
        Ok(Some(derive_shared_key(&pair.secret_key, &peer_public)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferenceStore;

    fn owner(c: char) -> Address {
        Address::parse(&format!("0x{}", c.to_string().repeat(64))).unwrap()
    }

    #[test]
    fn test_load_or_generate_is_stable() {
        let keys = KeyStore::new(Arc::new(MemoryPreferenceStore::new()));
        let alice = owner('a');

        let (first, generated) = keys.load_or_generate(&alice).unwrap();
        assert!(generated);
        let (second, generated) = keys.load_or_generate(&alice).unwrap();
        assert!(!generated);
        assert_eq!(first.public_key, second.public_key);
    }

    #[test]
    fn test_accounts_are_isolated() {
        let keys = KeyStore::new(Arc::new(MemoryPreferenceStore::new()));
        let (a, _) = keys.load_or_generate(&owner('a')).unwrap();
        let (b, _) = keys.load_or_generate(&owner('b')).unwrap();
        assert_ne!(a.public_key, b.public_key);

        keys.remove(&owner('a')).unwrap();
        assert!(keys.load(&owner('a')).unwrap().is_none());
        assert!(keys.load(&owner('b')).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_is_ignored() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.set(&secret_key_entry(&owner('a')), "%%%").unwrap();
        store.set(&secret_key_entry(&owner('b')), &BASE64.encode([1u8; 8])).unwrap();

        let keys = KeyStore::new(store);
        assert!(keys.load(&owner('a')).unwrap().is_none());
        assert!(keys.load(&owner('b')).unwrap().is_none());
    }

    #[test]
    fn test_shared_key_with_peer() {
        let keys = KeyStore::new(Arc::new(MemoryPreferenceStore::new()));
        let alice = owner('a');
        assert!(keys.shared_key_with(&alice, "AAAA").unwrap().is_none());

        let (pair, _) = keys.load_or_generate(&alice).unwrap();
        let bob = crypto::generate_key_pair();

        let ours = keys
            .shared_key_with(&alice, &bob.public_key_base64())
            .unwrap()
            .unwrap();
        let theirs = derive_shared_key(&bob.secret_key, &pair.public_key).unwrap();
        assert_eq!(ours, theirs);
    }
}
