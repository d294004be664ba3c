// src/ledger/reconcile.rs
//! Conversation reconciliation
//!
//! Turns the raw "message created" event stream and the owned message objects into:
//!
//! - the ordered message list between two participants ([`EventReconciler::fetch_messages`])
//! - one summary per conversation partner ([`EventReconciler::fetch_recent_chats`])
//!
//! Both are rebuilt from the full event history on every call. The ledger delivers events at
//! least once, so every step that could see the same occurrence twice deduplicates.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use super::decode::{decode_message_event, decode_message_object};
use super::{collect_all_events, collect_owned_objects, LedgerClient, LedgerError, RawEvent};
use crate::identity::IdentityResolver;
use crate::models::{
    millis_to_datetime, Address, ConversationMessage, ConversationSummary, MessageEvent, MessageObject, ObjectId,
};
use crate::payload::{KeyRing, PayloadDecoder, PayloadError};

pub const PREVIEW_CHARS: usize = 80;
pub const ENCRYPTED_PREVIEW: &str = "[encrypted message]";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Cannot read message {id}: {source}")]
    Payload {
        id: ObjectId,
        #[source]
        source: PayloadError,
    },
}

/// Identity of a logical event occurrence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EventKey {
    Message(ObjectId),
    Pair(Address, Address, u64),
}

impl EventKey {
    fn of(event: &MessageEvent) -> Self {
        match &event.message_id {
            Some(id) => EventKey::Message(id.clone()),
            None => EventKey::Pair(event.sender.clone(), event.recipient.clone(), event.timestamp),
        }
    }
}

/// Where the reconciler finds messages on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTypes {
    /// Type tag of the "message created" event
    pub event_type: String,
    /// Struct type of the message object
    pub object_type: String,
}

pub struct EventReconciler {
    ledger: Arc<dyn LedgerClient>,
    identities: Arc<IdentityResolver>,
    decoder: PayloadDecoder,
    types: MessageTypes,
    page_size: u32,
}

impl EventReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        identities: Arc<IdentityResolver>,
        decoder: PayloadDecoder,
        types: MessageTypes,
        page_size: u32,
    ) -> Self {
        Self {
            ledger,
            identities,
            decoder,
            types,
            page_size,
        }
    }

    /// All messages exchanged between `me` and `peer`, oldest first, each object exactly once.
    ///
    /// Encrypted content is opened with the key `keys` holds for the counterpart. A missing key or
    /// a failed decryption fails the call rather than showing ciphertext.
    pub async fn fetch_messages(
        &self,
        me: &Address,
        peer: &Address,
        keys: &KeyRing,
    ) -> Result<Vec<ConversationMessage>, ReconcileError> {
        let fetched_at = now_millis();
        let events = self.load_events(fetched_at).await?;

        let qualifying: Vec<MessageEvent> = events.into_iter().filter(|e| e.involves_pair(me, peer)).collect();
        if qualifying.is_empty() {
            debug!("No messages between {} and {}", me.short(), peer.short());
            return Ok(Vec::new());
        }

        // At most two directed pairs, in first-seen order
        let mut pairs: Vec<(&Address, &Address)> = Vec::new();
        for event in &qualifying {
            let pair = (&event.sender, &event.recipient);
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }

        // Owned objects per participant, fetched once each
        let mut owned: HashMap<Address, Vec<MessageObject>> = HashMap::new();
        for (sender, recipient) in &pairs {
            for owner in [*sender, *recipient] {
                if !owned.contains_key(owner) {
                    let objects = self.load_owned_messages(owner, fetched_at).await?;
                    owned.insert(owner.clone(), objects);
                }
            }
        }

        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut candidates: Vec<MessageObject> = Vec::new();
        for (sender, recipient) in &pairs {
            for owner in [*sender, *recipient] {
                let objects = owned.get(owner).map(Vec::as_slice).unwrap_or_default();
                for object in objects {
                    if object.matches_pair(sender, recipient) && seen.insert(object.id.clone()) {
                        candidates.push(object.clone());
                    }
                }
            }
        }

        // Objects the participants no longer own are still reachable by id
        for event in &qualifying {
            let Some(id) = &event.message_id else {
                continue;
            };
            if seen.contains(id) {
                continue;
            }
            match self.ledger.get_object(id).await? {
                Some(object) => match decode_message_object(&object, fetched_at) {
                    Ok(message) if message.matches_pair(&event.sender, &event.recipient) => {
                        seen.insert(message.id.clone());
                        candidates.push(message);
                    }
                    Ok(_) => warn!("Object {} does not belong to its event's participants", id),
                    Err(e) => warn!("Skipping message object {}: {}", id, e),
                },
                None => debug!("Message object {} not found", id),
            }
        }

        let mut messages = Vec::with_capacity(candidates.len());
        for object in candidates {
            let counterpart = if &object.sender == me { &object.recipient } else { &object.sender };
            match self.decoder.decode(&object.content, keys.get(counterpart)).await {
                Ok(content) => messages.push(ConversationMessage {
                    id: object.id,
                    sender: object.sender,
                    recipient: object.recipient,
                    content,
                    timestamp: millis_to_datetime(object.timestamp),
                }),
                Err(PayloadError::InvalidUtf8) => {
                    warn!("Skipping message {}: content is not valid UTF-8", object.id);
                }
                Err(source) => return Err(ReconcileError::Payload { id: object.id, source }),
            }
        }

        // Stable: equal timestamps keep arrival order
        messages.sort_by_key(|m| m.timestamp);

        info!(
            "Reconciled {} messages between {} and {}",
            messages.len(),
            me.short(),
            peer.short()
        );
        Ok(messages)
    }

    /// One summary per distinct partner of `me`, most recent conversation first.
    ///
    /// Only the latest message of each conversation is fetched. Partners are enriched one at a
    /// time.
    pub async fn fetch_recent_chats(
        &self,
        me: &Address,
        keys: &KeyRing,
    ) -> Result<Vec<ConversationSummary>, ReconcileError> {
        let fetched_at = now_millis();
        let events = self.load_events(fetched_at).await?;

        let mut latest: BTreeMap<Address, MessageEvent> = BTreeMap::new();
        for event in events {
            let Some(peer) = event.counterpart(me) else {
                continue;
            };
            if peer == me {
                continue;
            }
            // Ties keep the first event seen
            let newer = latest
                .get(peer)
                .map_or(true, |current| event.timestamp > current.timestamp);
            if newer {
                let peer = peer.clone();
                latest.insert(peer, event);
            }
        }

        let mut summaries = Vec::with_capacity(latest.len());
        for (peer, event) in &latest {
            let display_name = self.identities.display_name_or_short(peer).await;
            let preview = self.preview(event, peer, keys, fetched_at).await?;
            summaries.push(ConversationSummary {
                peer_address: peer.clone(),
                display_name,
                last_message_preview: preview,
                last_message_timestamp: event.timestamp,
            });
        }

        summaries.sort_by(|a, b| {
            b.last_message_timestamp
                .cmp(&a.last_message_timestamp)
                .then_with(|| a.peer_address.cmp(&b.peer_address))
        });

        info!("Found {} conversations for {}", summaries.len(), me.short());
        Ok(summaries)
    }

    async fn preview(
        &self,
        event: &MessageEvent,
        peer: &Address,
        keys: &KeyRing,
        fetched_at: u64,
    ) -> Result<String, ReconcileError> {
        let Some(id) = &event.message_id else {
            return Ok(String::new());
        };
        let Some(object) = self.ledger.get_object(id).await? else {
            debug!("Latest message {} with {} not found", id, peer.short());
            return Ok(String::new());
        };
        let message = match decode_message_object(&object, fetched_at) {
            Ok(message) if message.matches_pair(&event.sender, &event.recipient) => message,
            Ok(_) => {
                warn!("Object {} does not belong to its event's participants", id);
                return Ok(String::new());
            }
            Err(e) => {
                warn!("Cannot preview message {}: {}", id, e);
                return Ok(String::new());
            }
        };

        match self.decoder.decode(&message.content, keys.get(peer)).await {
            Ok(text) => Ok(truncate_preview(&text)),
            Err(PayloadError::MissingKey) => Ok(ENCRYPTED_PREVIEW.to_string()),
            Err(PayloadError::InvalidUtf8) => {
                warn!("Cannot preview message {}: content is not valid UTF-8", id);
                Ok(String::new())
            }
            Err(source) => Err(ReconcileError::Payload { id: id.clone(), source }),
        }
    }

    async fn load_events(&self, fetched_at: u64) -> Result<Vec<MessageEvent>, LedgerError> {
        let raw = collect_all_events(self.ledger.as_ref(), &self.types.event_type, self.page_size).await?;
        Ok(dedupe_events(decode_events(&raw, fetched_at)))
    }

    async fn load_owned_messages(&self, owner: &Address, fetched_at: u64) -> Result<Vec<MessageObject>, LedgerError> {
        let objects = collect_owned_objects(
            self.ledger.as_ref(),
            owner.as_str(),
            Some(&self.types.object_type),
            self.page_size,
        )
        .await?;

        Ok(objects
            .iter()
            .filter_map(|object| match decode_message_object(object, fetched_at) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Skipping message object {}: {}", object.object_id, e);
                    None
                }
            })
            .collect())
    }
}

/// Decode every raw event, skipping the ones with missing or invalid fields
fn decode_events(raw: &[RawEvent], fetched_at: u64) -> Vec<MessageEvent> {
    raw.iter()
        .filter_map(|event| match decode_message_event(event, fetched_at) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping event {}:{}: {}", event.id.tx_digest, event.id.event_seq, e);
                None
            }
        })
        .collect()
}

/// Keep the first occurrence of each logical event
fn dedupe_events(events: Vec<MessageEvent>) -> Vec<MessageEvent> {
    let mut seen = HashSet::new();
    let before = events.len();
    let unique: Vec<MessageEvent> = events.into_iter().filter(|e| seen.insert(EventKey::of(e))).collect();
    if unique.len() != before {
        debug!("Dropped {} duplicate events", before - unique.len());
    }
    unique
}

/// First [`PREVIEW_CHARS`] characters, with an ellipsis when cut
pub fn truncate_preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
