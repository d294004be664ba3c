// src/ledger/rpc.rs
//! JSON-RPC 2.0 [`LedgerClient`]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    EventCursor, EventPage, EventQuery, LedgerClient, LedgerError, LedgerObject, ObjectPage, OwnedObjectsQuery,
    RawEvent,
};

pub struct RpcLedgerClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventEnvelope {
    id: EventCursor,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    parsed_json: Value,
    timestamp_ms: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPageEnvelope {
    #[serde(default)]
    data: Vec<EventEnvelope>,
    next_cursor: Option<EventCursor>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    data: Option<ObjectData>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectData {
    object_id: String,
    #[serde(rename = "type")]
    object_type: Option<String>,
    content: Option<ObjectContent>,
}

#[derive(Debug, Deserialize)]
struct ObjectContent {
    #[serde(rename = "type")]
    object_type: Option<String>,
    #[serde(default)]
    fields: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectPageEnvelope {
    #[serde(default)]
    data: Vec<ObjectResponse>,
    next_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

impl ObjectData {
    fn into_object(self) -> LedgerObject {
        let (content_type, fields) = match self.content {
            Some(content) => (content.object_type, content.fields),
            None => (None, Value::Null),
        };
        LedgerObject {
            object_id: self.object_id,
            object_type: self.object_type.or(content_type).unwrap_or_default(),
            fields,
        }
    }
}

fn object_options() -> Value {
    json!({ "showContent": true, "showType": true })
}

impl RpcLedgerClient {
    pub fn new(url: &str, timeout: Option<Duration>) -> Result<Self, LedgerError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!("RPC {} #{}: {}", method, id, request["params"]);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("{} returned HTTP {}", method, status)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("{} response unreadable: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(LedgerError::Transport(format!("{} failed: {}", method, error)));
        }
        body.result
            .ok_or_else(|| LedgerError::Transport(format!("{} response carries no result", method)))
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn query_events(&self, query: &EventQuery) -> Result<EventPage, LedgerError> {
        let params = json!([
            { "MoveEventType": query.event_type },
            query.cursor,
            query.limit,
            query.descending,
        ]);
        let page: EventPageEnvelope = self.call("suix_queryEvents", params).await?;
        debug!(
            "suix_queryEvents returned {} events (more: {})",
            page.data.len(),
            page.has_next_page
        );

        Ok(EventPage {
            data: page
                .data
                .into_iter()
                .map(|e| RawEvent {
                    id: e.id,
                    event_type: e.event_type,
                    parsed_json: e.parsed_json,
                    timestamp_ms: e.timestamp_ms,
                })
                .collect(),
            next_cursor: page.next_cursor,
            has_next_page: page.has_next_page,
        })
    }

    async fn get_owned_objects(&self, query: &OwnedObjectsQuery) -> Result<ObjectPage, LedgerError> {
        let mut object_query = json!({ "options": object_options() });
        if let Some(struct_type) = &query.struct_type {
            object_query["filter"] = json!({ "StructType": struct_type });
        }
        let params = json!([query.owner, object_query, query.cursor, query.limit]);
        let page: ObjectPageEnvelope = self.call("suix_getOwnedObjects", params).await?;

        Ok(ObjectPage {
            data: page
                .data
                .into_iter()
                .filter_map(|entry| entry.data.map(ObjectData::into_object))
                .collect(),
            next_cursor: page.next_cursor,
            has_next_page: page.has_next_page,
        })
    }

    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError> {
        let params = json!([object_id, object_options()]);
        let response: ObjectResponse = self.call("sui_getObject", params).await?;

        // A per-object error (deleted, never existed) is not a transport failure
        if let Some(error) = response.error {
            debug!("Object {} unavailable: {}", object_id, error);
            return Ok(None);
        }
        Ok(response.data.map(ObjectData::into_object))
    }
}
