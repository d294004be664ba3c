// src/ledger/mod.rs
//! Ledger client contract
//!
//! The reconciler only needs three read primitives from the chain: paged event queries,
//! paged owned-object listings and single object lookups. [`LedgerClient`] is that seam;
//! [`rpc::RpcLedgerClient`] implements it over JSON-RPC.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod decode;
pub mod reconcile;
pub mod rpc;

/// Errors related to the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger could not be reached or answered with an error. Surface it; the user retries.
    #[error("Ledger transport error: {0}")]
    Transport(String),

    /// A response or record is missing required fields
    #[error("Malformed ledger data: {0}")]
    MalformedData(String),
}

/// Position in an event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCursor {
    pub tx_digest: String,
    pub event_seq: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Fully qualified event type tag
    pub event_type: String,
    pub cursor: Option<EventCursor>,
    pub limit: u32,
    pub descending: bool,
}

/// An event as returned by the ledger, before any interpretation of its payload
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub id: EventCursor,
    pub event_type: String,
    pub parsed_json: serde_json::Value,
    /// Block time, when the ledger reports one
    pub timestamp_ms: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventPage {
    pub data: Vec<RawEvent>,
    pub next_cursor: Option<EventCursor>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedObjectsQuery {
    pub owner: String,
    /// Restrict to objects of this struct type
    pub struct_type: Option<String>,
    pub cursor: Option<String>,
    pub limit: u32,
}

/// An object with its typed content flattened to a JSON field map
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerObject {
    pub object_id: String,
    pub object_type: String,
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectPage {
    pub data: Vec<LedgerObject>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

/// Read access to the chain. Implementations must be idempotent; results may lag behind
/// just-submitted transactions.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn query_events(&self, query: &EventQuery) -> Result<EventPage, LedgerError>;

    async fn get_owned_objects(&self, query: &OwnedObjectsQuery) -> Result<ObjectPage, LedgerError>;

    /// `Ok(None)` when the object does not exist (or was deleted)
    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError>;
}

/// Page through every event of `event_type`, oldest first.
///
/// Stops only when the ledger reports no further pages. A failed page fails the whole call,
/// so a partial history is never returned.
pub async fn collect_all_events(
    ledger: &dyn LedgerClient,
    event_type: &str,
    page_size: u32,
) -> Result<Vec<RawEvent>, LedgerError> {
    let mut events = Vec::new();
    let mut query = EventQuery {
        event_type: event_type.to_string(),
        cursor: None,
        limit: page_size,
        descending: false,
    };
    let mut pages = 0usize;

    loop {
        let page = ledger.query_events(&query).await?;
        pages += 1;
        events.extend(page.data);

        if !page.has_next_page {
            break;
        }
        match page.next_cursor {
            Some(cursor) => query.cursor = Some(cursor),
            None => {
                return Err(LedgerError::MalformedData(
                    "event page reports more pages but carries no cursor".to_string(),
                ))
            }
        }
    }

    debug!("Collected {} {} events over {} pages", events.len(), event_type, pages);
    Ok(events)
}

/// Page through every object owned by `owner`, optionally restricted to one struct type
pub async fn collect_owned_objects(
    ledger: &dyn LedgerClient,
    owner: &str,
    struct_type: Option<&str>,
    page_size: u32,
) -> Result<Vec<LedgerObject>, LedgerError> {
    let mut objects = Vec::new();
    let mut query = OwnedObjectsQuery {
        owner: owner.to_string(),
        struct_type: struct_type.map(str::to_string),
        cursor: None,
        limit: page_size,
    };

    loop {
        let page = ledger.get_owned_objects(&query).await?;
        objects.extend(page.data);

        if !page.has_next_page {
            break;
        }
        match page.next_cursor {
            Some(cursor) => query.cursor = Some(cursor),
            None => {
                return Err(LedgerError::MalformedData(
                    "object page reports more pages but carries no cursor".to_string(),
                ))
            }
        }
    }

    debug!("Collected {} objects owned by {}", objects.len(), owner);
    Ok(objects)
}
