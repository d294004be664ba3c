// Common test utilities for integration tests
// In-memory ledger and storage doubles plus fixture builders
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use log::LevelFilter;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use chainpost::{
    identity::{IdentityResolver, RenamePolicy},
    ledger::{
        reconcile::{EventReconciler, MessageTypes},
        EventCursor, EventPage, EventQuery, LedgerClient, LedgerError, LedgerObject, ObjectPage,
        OwnedObjectsQuery, RawEvent,
    },
    models::Address,
    payload::PayloadDecoder,
    storage::{BlobTransport, HttpMethod, HttpReply, HttpRequest, StorageEndpoint},
};

pub const MESSAGE_EVENT_TYPE: &str = "0xc0de::messaging::MessageCreated";
pub const MESSAGE_OBJECT_TYPE: &str = "0xc0de::messaging::Message";
pub const IDENTITY_TYPE: &str = "0xc0de::identity::Identity";

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// `0x` followed by 64 copies of `c`
pub fn addr(c: char) -> Address {
    Address::parse(&format!("0x{}", c.to_string().repeat(64))).expect("valid test address")
}

pub fn message_event(sender: &Address, recipient: &Address, message_id: Option<&str>, timestamp: u64) -> RawEvent {
    let mut parsed_json = json!({
        "sender": sender.as_str(),
        "recipient": recipient.as_str(),
        "timestamp": timestamp.to_string(),
    });
    if let Some(id) = message_id {
        parsed_json["message_id"] = json!(id);
    }
    RawEvent {
        id: EventCursor {
            tx_digest: format!("tx-{}-{}", message_id.unwrap_or("none"), timestamp),
            event_seq: "0".to_string(),
        },
        event_type: MESSAGE_EVENT_TYPE.to_string(),
        parsed_json,
        timestamp_ms: None,
    }
}

pub fn message_object_bytes(
    id: &str,
    sender: &Address,
    recipient: &Address,
    content: &[u8],
    timestamp: u64,
) -> LedgerObject {
    LedgerObject {
        object_id: id.to_string(),
        object_type: MESSAGE_OBJECT_TYPE.to_string(),
        fields: json!({
            "id": { "id": id },
            "sender": sender.as_str(),
            "recipient": recipient.as_str(),
            "content": content,
            "timestamp": timestamp.to_string(),
        }),
    }
}

pub fn message_object(id: &str, sender: &Address, recipient: &Address, content: &str, timestamp: u64) -> LedgerObject {
    message_object_bytes(id, sender, recipient, content.as_bytes(), timestamp)
}

pub fn identity_object(id: &str, display_name: Option<&str>, name_change_count: u32) -> LedgerObject {
    let display_name = match display_name {
        Some(name) => json!(name.as_bytes()),
        None => Value::Null,
    };
    LedgerObject {
        object_id: id.to_string(),
        object_type: IDENTITY_TYPE.to_string(),
        fields: json!({
            "display_name": display_name,
            "name_change_count": name_change_count,
        }),
    }
}

/// Scripted ledger: fixed event pages, owned objects per address, objects by id.
#[derive(Default)]
pub struct MockLedger {
    event_pages: Vec<Vec<RawEvent>>,
    failing_event_page: Option<usize>,
    owned: HashMap<String, Vec<LedgerObject>>,
    objects: HashMap<String, LedgerObject>,
    object_page_size: Option<usize>,
    pub event_queries: AtomicUsize,
    pub owned_queries: AtomicUsize,
    pub object_lookups: AtomicUsize,
    pub looked_up: Mutex<Vec<String>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events served one page per query, in the given order
    pub fn with_event_pages(mut self, pages: Vec<Vec<RawEvent>>) -> Self {
        self.event_pages = pages;
        self
    }

    pub fn with_events(self, events: Vec<RawEvent>) -> Self {
        self.with_event_pages(vec![events])
    }

    /// Make the query for page `index` fail with a transport error
    pub fn failing_on_page(mut self, index: usize) -> Self {
        self.failing_event_page = Some(index);
        self
    }

    /// Give `owner` these objects and make each reachable by id
    pub fn with_owned(mut self, owner: &Address, objects: Vec<LedgerObject>) -> Self {
        for object in &objects {
            self.objects.insert(object.object_id.clone(), object.clone());
        }
        self.owned.entry(owner.to_string()).or_default().extend(objects);
        self
    }

    /// Reachable by id but owned by nobody we query
    pub fn with_object(mut self, object: LedgerObject) -> Self {
        self.objects.insert(object.object_id.clone(), object);
        self
    }

    pub fn with_object_page_size(mut self, size: usize) -> Self {
        self.object_page_size = Some(size);
        self
    }

    pub fn lookups(&self) -> usize {
        self.object_lookups.load(Ordering::SeqCst)
    }
}

fn page_cursor(index: usize) -> EventCursor {
    EventCursor {
        tx_digest: "page".to_string(),
        event_seq: index.to_string(),
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn query_events(&self, query: &EventQuery) -> Result<EventPage, LedgerError> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        let index = match &query.cursor {
            None => 0,
            Some(cursor) => cursor
                .event_seq
                .parse::<usize>()
                .map_err(|_| LedgerError::Transport("bad cursor".to_string()))?,
        };

        if self.failing_event_page == Some(index) {
            return Err(LedgerError::Transport(format!("page {} unavailable", index)));
        }
        if query.event_type != MESSAGE_EVENT_TYPE {
            return Ok(EventPage::default());
        }

        let data = self.event_pages.get(index).cloned().unwrap_or_default();
        let has_next_page = index + 1 < self.event_pages.len();
        Ok(EventPage {
            data,
            next_cursor: has_next_page.then(|| page_cursor(index + 1)),
            has_next_page,
        })
    }

    async fn get_owned_objects(&self, query: &OwnedObjectsQuery) -> Result<ObjectPage, LedgerError> {
        self.owned_queries.fetch_add(1, Ordering::SeqCst);
        let matching: Vec<LedgerObject> = self
            .owned
            .get(&query.owner)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|o| query.struct_type.as_deref().map_or(true, |t| o.object_type == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let start = match &query.cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| LedgerError::Transport("bad cursor".to_string()))?,
        };
        let size = self.object_page_size.unwrap_or(usize::MAX);
        let end = start.saturating_add(size).min(matching.len());
        let has_next_page = end < matching.len();

        Ok(ObjectPage {
            data: matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
            next_cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        })
    }

    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError> {
        self.object_lookups.fetch_add(1, Ordering::SeqCst);
        self.looked_up.lock().unwrap().push(object_id.to_string());
        Ok(self.objects.get(object_id).cloned())
    }
}

pub fn message_types() -> MessageTypes {
    MessageTypes {
        event_type: MESSAGE_EVENT_TYPE.to_string(),
        object_type: MESSAGE_OBJECT_TYPE.to_string(),
    }
}

pub fn identity_resolver(ledger: Arc<MockLedger>) -> Arc<IdentityResolver> {
    Arc::new(IdentityResolver::new(ledger, IDENTITY_TYPE, 2, RenamePolicy::default()))
}

/// Reconciler over `ledger` with a small page size so pagination is exercised
pub fn reconciler(ledger: Arc<MockLedger>) -> EventReconciler {
    reconciler_with_decoder(ledger, PayloadDecoder::default())
}

pub fn reconciler_with_decoder(ledger: Arc<MockLedger>, decoder: PayloadDecoder) -> EventReconciler {
    EventReconciler::new(
        ledger.clone(),
        identity_resolver(ledger),
        decoder,
        message_types(),
        2,
    )
}

/// `http://pub{n}.test` / `http://agg{n}.test`
pub fn endpoint(n: usize) -> StorageEndpoint {
    StorageEndpoint::new(&format!("http://pub{}.test", n), &format!("http://agg{}.test", n))
}

/// One storage network shared by every endpoint; hosts can be taken down or made to answer
/// with an error status.
#[derive(Default)]
pub struct MockTransport {
    down: Mutex<HashSet<String>>,
    status_override: Mutex<HashMap<String, u16>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub requests: Mutex<Vec<(HttpMethod, String)>>,
}

fn host_of(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or_default()
        .to_string()
}

pub fn blob_id_for(data: &[u8]) -> String {
    format!("blob-{}", hex::encode(&Sha256::digest(data)[..8]))
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_down(&self, host: &str) {
        self.down.lock().unwrap().insert(host.to_string());
    }

    pub fn bring_up(&self, host: &str) {
        self.down.lock().unwrap().remove(host);
    }

    pub fn answer_with(&self, host: &str, status: u16) {
        self.status_override.lock().unwrap().insert(host.to_string(), status);
    }

    pub fn put_blob(&self, blob_id: &str, data: &[u8]) {
        self.blobs.lock().unwrap().insert(blob_id.to_string(), data.to_vec());
    }

    pub fn has_blob(&self, blob_id: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(blob_id)
    }

    pub fn hosts_contacted(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(_, url)| host_of(url)).collect()
    }

    fn status(code: u16) -> HttpReply {
        HttpReply {
            status: code,
            ..HttpReply::default()
        }
    }
}

#[async_trait]
impl BlobTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, String> {
        self.requests
            .lock()
            .unwrap()
            .push((request.method, request.url.clone()));

        let host = host_of(&request.url);
        if self.down.lock().unwrap().contains(&host) {
            return Err(format!("connection refused: {}", host));
        }
        if let Some(code) = self.status_override.lock().unwrap().get(&host) {
            return Ok(Self::status(*code));
        }

        let path = request.url.split(&host).nth(1).unwrap_or_default().to_string();
        let blob_id = path
            .trim_start_matches("/v1/")
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();

        let mut blobs = self.blobs.lock().unwrap();
        let reply = match request.method {
            HttpMethod::Put if path.starts_with("/v1/store") => {
                let body = request.body.unwrap_or_default();
                let id = blob_id_for(&body);
                let size = body.len();
                blobs.insert(id.clone(), body);
                HttpReply {
                    status: 200,
                    headers: HashMap::new(),
                    body: json!({ "newlyCreated": { "blobObject": { "blobId": id, "size": size } } })
                        .to_string()
                        .into_bytes(),
                }
            }
            HttpMethod::Put => Self::status(405),
            HttpMethod::Get => match blobs.get(&blob_id) {
                Some(data) => HttpReply {
                    status: 200,
                    headers: HashMap::new(),
                    body: data.clone(),
                },
                None => Self::status(404),
            },
            HttpMethod::Head => match blobs.get(&blob_id) {
                Some(data) => HttpReply {
                    status: 200,
                    headers: HashMap::from([
                        ("content-length".to_string(), data.len().to_string()),
                        ("content-type".to_string(), "application/octet-stream".to_string()),
                        ("last-modified".to_string(), "Mon, 19 Oct 2026 10:00:00 GMT".to_string()),
                    ]),
                    body: Vec::new(),
                },
                None => Self::status(404),
            },
            HttpMethod::Delete => match blobs.remove(&blob_id) {
                Some(_) => Self::status(204),
                None => Self::status(404),
            },
        };
        Ok(reply)
    }
}
