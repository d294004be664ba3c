// src/models.rs
//! Core data model shared by the reconciler, the identity resolver and the storage client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of hex characters in an address (after the `0x` prefix)
pub const ADDRESS_HEX_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("address must have {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("address contains non-hex characters: {0}")]
    InvalidCharacters(String),
}

/// A participant identifier: `0x` followed by 64 hex characters.
///
/// Equality is an exact string match, the ledger is the authority on casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        let hex_part = value
            .strip_prefix("0x")
            .ok_or_else(|| AddressError::MissingPrefix(value.to_string()))?;

        if hex_part.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_HEX_LEN,
                actual: hex_part.len(),
            });
        }

        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidCharacters(value.to_string()));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used when no display name is registered, e.g. `0x1234…cdef`
    pub fn short(&self) -> String {
        let hex_part = &self.0[2..];
        format!("0x{}…{}", &hex_part[..4], &hex_part[hex_part.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Identifier of an on-chain object. Opaque; compared exactly.
pub type ObjectId = String;

/// A "message created" event emitted by the messaging program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub sender: Address,
    pub recipient: Address,
    /// Absent on events emitted by older program versions
    pub message_id: Option<ObjectId>,
    /// Epoch milliseconds
    pub timestamp: u64,
}

impl MessageEvent {
    /// True if this event belongs to the unordered pair `{a, b}`
    pub fn involves_pair(&self, a: &Address, b: &Address) -> bool {
        (&self.sender == a && &self.recipient == b) || (&self.sender == b && &self.recipient == a)
    }

    /// The other side of the conversation as seen from `me`, if `me` took part
    pub fn counterpart(&self, me: &Address) -> Option<&Address> {
        if &self.sender == me {
            Some(&self.recipient)
        } else if &self.recipient == me {
            Some(&self.sender)
        } else {
            None
        }
    }
}

/// Durable on-chain message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageObject {
    pub id: ObjectId,
    pub sender: Address,
    pub recipient: Address,
    /// Raw content: UTF-8 text, an encrypted envelope or a blob reference
    pub content: Vec<u8>,
    pub timestamp: u64,
}

impl MessageObject {
    pub fn matches_pair(&self, sender: &Address, recipient: &Address) -> bool {
        &self.sender == sender && &self.recipient == recipient
    }
}

/// A reconciled, decoded message ready for display. Rebuilt on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMessage {
    pub id: ObjectId,
    pub sender: Address,
    pub recipient: Address,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp.timestamp_millis().max(0) as u64
    }
}

/// One entry of the recent chats list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub peer_address: Address,
    pub display_name: String,
    pub last_message_preview: String,
    pub last_message_timestamp: u64,
}

/// On-chain identity object owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: ObjectId,
    pub owner: Address,
    pub display_name: Option<Vec<u8>>,
    pub name_change_count: u32,
}

impl IdentityRecord {
    /// Display name as text; `None` when absent, empty or not valid UTF-8
    pub fn display_name_text(&self) -> Option<String> {
        let bytes = self.display_name.as_ref()?;
        let name = std::str::from_utf8(bytes).ok()?.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Handle to a blob stored on the off-chain storage network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub blob_id: String,
    pub size: u64,
    /// Base URL of the endpoint that accepted the upload
    pub endpoint: String,
}

/// Convert epoch milliseconds to a UTC date, clamping values chrono cannot represent
pub fn millis_to_datetime(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(|m| Utc.timestamp_millis_opt(m).single())
        .unwrap_or_else(Utc::now)
}
