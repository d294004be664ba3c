// src/outbox.rs
//! Outgoing messages and identity transactions
//!
//! [`MessageComposer`] turns text into on-chain content bytes (see [`crate::payload`]).
//! [`Outbox`] wraps those bytes, and identity updates, into move calls for the wallet to sign.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ProgramConfig;
use crate::crypto::{self, CryptoError, SharedKey};
use crate::identity::{validate_display_name, IdentityError, RenamePolicy};
use crate::models::{Address, IdentityRecord};
use crate::payload::{Payload, BLOB_PREFIX, ENCRYPTED_BLOB_PREFIX, ENCRYPTED_PREFIX};
use crate::storage::tiered::TieredBlobStore;
use crate::storage::{StorageError, StoreOptions};

/// Shared clock object passed to entry functions that record a timestamp
pub const CLOCK_OBJECT_ID: &str = "0x6";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Wallet error: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Content of {0} bytes must go to blob storage but none is configured")]
    NeedsBlobStore(usize),
}

/// An entry function call for the wallet to sign and submit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveCall {
    /// `package::module::function`
    pub target: String,
    pub arguments: Vec<Value>,
    /// Coin amount to split off the gas coin and pass as the last argument
    pub payment: Option<u64>,
}

/// The connected wallet
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn address(&self) -> Option<Address>;

    fn is_connected(&self) -> bool;

    /// Returns the transaction digest
    async fn sign_and_submit(&self, call: MoveCall) -> Result<String, WalletError>;
}

pub struct MessageComposer {
    blobs: Option<Arc<TieredBlobStore>>,
    inline_limit: usize,
    store_options: StoreOptions,
}

impl MessageComposer {
    pub fn new(blobs: Option<Arc<TieredBlobStore>>, inline_limit: usize, store_options: StoreOptions) -> Self {
        Self {
            blobs,
            inline_limit,
            store_options,
        }
    }

    /// Encode `text` as content bytes, encrypting when `key` is given and offloading to blob
    /// storage when the inline form would exceed the limit.
    pub async fn compose(&self, text: &str, key: Option<&SharedKey>) -> Result<Vec<u8>, OutboxError> {
        match key {
            Some(key) => {
                let inline = Payload::Encrypted(crypto::encrypt_message(text, key.as_ref())?).encode();
                if inline.len() <= self.inline_limit {
                    return Ok(inline);
                }
                let sealed = crypto::encrypt_file(text.as_bytes(), key.as_ref())?;
                let blob_id = self.offload(&sealed).await?;
                Ok(Payload::EncryptedBlob(blob_id).encode())
            }
            None => {
                // Plain text that looks like an envelope would be misread, so it goes off-chain
                if text.len() <= self.inline_limit && !has_reserved_prefix(text) {
                    return Ok(Payload::Plain(text.to_string()).encode());
                }
                let blob_id = self.offload(text.as_bytes()).await?;
                Ok(Payload::Blob(blob_id).encode())
            }
        }
    }

    async fn offload(&self, data: &[u8]) -> Result<String, OutboxError> {
        let store = self.blobs.as_ref().ok_or(OutboxError::NeedsBlobStore(data.len()))?;
        let (record, tier) = store.store(data, self.store_options).await?;
        debug!("Offloaded {} bytes as {} ({:?})", data.len(), record.blob_id, tier);
        Ok(record.blob_id)
    }
}

fn has_reserved_prefix(text: &str) -> bool {
    [ENCRYPTED_PREFIX, BLOB_PREFIX, ENCRYPTED_BLOB_PREFIX]
        .iter()
        .any(|prefix| text.starts_with(*prefix))
}

fn bytes_argument(bytes: &[u8]) -> Value {
    json!(bytes)
}

pub struct Outbox {
    wallet: Arc<dyn WalletProvider>,
    composer: MessageComposer,
    program: ProgramConfig,
    rename: RenamePolicy,
}

impl Outbox {
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        composer: MessageComposer,
        program: ProgramConfig,
        rename: RenamePolicy,
    ) -> Self {
        Self {
            wallet,
            composer,
            program,
            rename,
        }
    }

    fn connected_address(&self) -> Result<Address, WalletError> {
        if !self.wallet.is_connected() {
            return Err(WalletError::NotConnected);
        }
        self.wallet.address().ok_or(WalletError::NotConnected)
    }

    /// Send `text` to `recipient`. Returns the transaction digest.
    pub async fn send_message(
        &self,
        recipient: &Address,
        text: &str,
        key: Option<&SharedKey>,
    ) -> Result<String, OutboxError> {
        let sender = self.connected_address()?;
        if text.trim().is_empty() {
            return Err(OutboxError::EmptyMessage);
        }

        let content = self.composer.compose(text, key).await?;
        let call = MoveCall {
            target: self.program.target(&self.program.messaging_module, "send_message"),
            arguments: vec![
                json!(recipient.as_str()),
                bytes_argument(&content),
                json!(CLOCK_OBJECT_ID),
            ],
            payment: None,
        };

        let digest = self.wallet.sign_and_submit(call).await?;
        info!(
            "Message from {} to {} submitted in {}",
            sender.short(),
            recipient.short(),
            digest
        );
        Ok(digest)
    }

    pub async fn register_identity(&self, display_name: &str) -> Result<String, OutboxError> {
        let owner = self.connected_address()?;
        let name = validate_display_name(display_name)?;

        let call = MoveCall {
            target: self.program.target(&self.program.identity_module, "register"),
            arguments: vec![bytes_argument(name.as_bytes())],
            payment: None,
        };
        let digest = self.wallet.sign_and_submit(call).await?;
        info!("Identity '{}' registered for {} in {}", name, owner.short(), digest);
        Ok(digest)
    }

    /// Rename an existing identity, paying the fee once the free renames are used up
    pub async fn update_display_name(&self, record: &IdentityRecord, display_name: &str) -> Result<String, OutboxError> {
        self.connected_address()?;
        let name = validate_display_name(display_name)?;
        let fee = self.rename.rename_fee(record);

        let call = MoveCall {
            target: self.program.target(&self.program.identity_module, "update_display_name"),
            arguments: vec![json!(record.id), bytes_argument(name.as_bytes())],
            payment: (fee > 0).then_some(fee),
        };
        let digest = self.wallet.sign_and_submit(call).await?;
        info!(
            "Identity {} renamed to '{}' (rename #{}, fee {}) in {}",
            record.id,
            name,
            record.name_change_count + 1,
            fee,
            digest
        );
        Ok(digest)
    }
}
