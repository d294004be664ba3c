// src/identity.rs
//! Display name resolution and rename pricing

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::decode::decode_identity_record;
use crate::ledger::{collect_owned_objects, LedgerClient, LedgerError};
use crate::models::{Address, IdentityRecord};

pub const MAX_DISPLAY_NAME_CHARS: usize = 32;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid display name: {0}")]
    InvalidName(String),
}

/// How many renames are free and what the rest cost (in the ledger's smallest coin unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePolicy {
    pub free_renames: u32,
    pub fee: u64,
}

impl Default for RenamePolicy {
    fn default() -> Self {
        Self {
            free_renames: 3,
            fee: 100_000_000,
        }
    }
}

impl RenamePolicy {
    /// Fee due for the next rename of an identity that has been renamed `name_change_count` times
    pub fn fee_for(&self, name_change_count: u32) -> u64 {
        if name_change_count < self.free_renames {
            0
        } else {
            self.fee
        }
    }

    pub fn rename_fee(&self, record: &IdentityRecord) -> u64 {
        self.fee_for(record.name_change_count)
    }
}

/// Trim and check a display name before it goes on chain
pub fn validate_display_name(name: &str) -> Result<String, IdentityError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::InvalidName("name is empty".to_string()));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_DISPLAY_NAME_CHARS {
        return Err(IdentityError::InvalidName(format!(
            "{} characters, at most {} allowed",
            chars, MAX_DISPLAY_NAME_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

pub struct IdentityResolver {
    ledger: Arc<dyn LedgerClient>,
    identity_type: String,
    page_size: u32,
    policy: RenamePolicy,
}

impl IdentityResolver {
    pub fn new(ledger: Arc<dyn LedgerClient>, identity_type: &str, page_size: u32, policy: RenamePolicy) -> Self {
        Self {
            ledger,
            identity_type: identity_type.to_string(),
            page_size,
            policy,
        }
    }

    pub fn policy(&self) -> &RenamePolicy {
        &self.policy
    }

    /// Find the identity object owned by `owner`. Objects that cannot be decoded are skipped;
    /// if several decode, the first listed wins.
    pub async fn resolve_record(&self, owner: &Address) -> Result<Option<IdentityRecord>, LedgerError> {
        let objects = collect_owned_objects(
            self.ledger.as_ref(),
            owner.as_str(),
            Some(&self.identity_type),
            self.page_size,
        )
        .await?;

        for object in &objects {
            match decode_identity_record(object, owner) {
                Ok(record) => {
                    debug!("Identity {} resolved for {}", record.id, owner.short());
                    return Ok(Some(record));
                }
                Err(e) => warn!("Skipping identity object {}: {}", object.object_id, e),
            }
        }
        Ok(None)
    }

    pub async fn display_name(&self, owner: &Address) -> Result<Option<String>, LedgerError> {
        Ok(self
            .resolve_record(owner)
            .await?
            .and_then(|record| record.display_name_text()))
    }

    /// Best effort: the shortened address when no name is registered or the lookup fails
    pub async fn display_name_or_short(&self, owner: &Address) -> String {
        match self.display_name(owner).await {
            Ok(Some(name)) => name,
            Ok(None) => owner.short(),
            Err(e) => {
                warn!("Display name lookup for {} failed: {}", owner.short(), e);
                owner.short()
            }
        }
    }

    pub fn rename_fee(&self, record: &IdentityRecord) -> u64 {
        self.policy.rename_fee(record)
    }
}
