//! Decoding of raw ledger events and objects into the typed model.
//!
//! Move values arrive as loosely typed JSON: `u64` fields may be numbers or decimal strings,
//! `vector<u8>` fields may be number arrays or strings. Everything here is tolerant of those
//! encodings and strict about missing fields.

use serde_json::Value;

use super::{LedgerError, LedgerObject, RawEvent};
use crate::models::{Address, IdentityRecord, MessageEvent, MessageObject};

/// Largest integer a double can hold exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Decode a millisecond timestamp, accepting numbers and decimal strings.
///
/// Returns `None` for anything that is not a non-negative integer at most [`MAX_SAFE_INTEGER`].
pub fn decode_timestamp(value: &Value) -> Option<u64> {
    let decoded = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= MAX_SAFE_INTEGER as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;

    (decoded <= MAX_SAFE_INTEGER).then_some(decoded)
}

/// Decode a `vector<u8>`: a JSON array of bytes, or a string taken as its UTF-8 bytes
pub fn decode_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        Value::String(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

fn field<'a>(fields: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| fields.get(*name))
        .filter(|value| !value.is_null())
}

fn address_field(fields: &Value, names: &[&str], what: &str) -> Result<Address, LedgerError> {
    let raw = field(fields, names)
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::MalformedData(format!("missing {}", what)))?;
    Address::parse(raw).map_err(|e| LedgerError::MalformedData(format!("bad {}: {}", what, e)))
}

/// Interpret a "message created" event.
///
/// A timestamp that is missing or not losslessly representable is replaced by `fetched_at`.
pub fn decode_message_event(raw: &RawEvent, fetched_at: u64) -> Result<MessageEvent, LedgerError> {
    let fields = &raw.parsed_json;
    let sender = address_field(fields, &["sender"], "sender")?;
    let recipient = address_field(fields, &["recipient"], "recipient")?;

    let message_id = field(fields, &["message_id", "messageId"])
        .and_then(Value::as_str)
        .map(str::to_string);

    let timestamp = field(fields, &["timestamp", "timestamp_ms"])
        .or(raw.timestamp_ms.as_ref())
        .and_then(decode_timestamp)
        .unwrap_or_else(|| {
            log::warn!(
                "Event {}:{} has no usable timestamp, using fetch time",
                raw.id.tx_digest,
                raw.id.event_seq
            );
            fetched_at
        });

    Ok(MessageEvent {
        sender,
        recipient,
        message_id,
        timestamp,
    })
}

/// Interpret a message object. Same timestamp fallback as events.
pub fn decode_message_object(object: &LedgerObject, fetched_at: u64) -> Result<MessageObject, LedgerError> {
    let fields = &object.fields;
    let sender = address_field(fields, &["sender"], "sender")?;
    let recipient = address_field(fields, &["recipient"], "recipient")?;
    let content = field(fields, &["content"])
        .and_then(decode_bytes)
        .ok_or_else(|| LedgerError::MalformedData(format!("object {} has no content", object.object_id)))?;
    let timestamp = field(fields, &["timestamp", "timestamp_ms"])
        .and_then(decode_timestamp)
        .unwrap_or(fetched_at);

    Ok(MessageObject {
        id: object.object_id.clone(),
        sender,
        recipient,
        content,
        timestamp,
    })
}

/// Interpret an identity object owned by `owner`
pub fn decode_identity_record(object: &LedgerObject, owner: &Address) -> Result<IdentityRecord, LedgerError> {
    let fields = &object.fields;

    // Option<vector<u8>> is rendered either bare or wrapped as {"vec": [...]}
    let display_name = match field(fields, &["display_name"]) {
        None => None,
        Some(Value::Object(wrapper)) => wrapper
            .get("vec")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(decode_bytes),
        Some(value) => Some(decode_bytes(value).ok_or_else(|| {
            LedgerError::MalformedData(format!("identity {} has an unreadable display_name", object.object_id))
        })?),
    };

    let name_change_count = match field(fields, &["name_change_count"]) {
        None => 0,
        Some(value) => decode_timestamp(value)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                LedgerError::MalformedData(format!("identity {} has a bad name_change_count", object.object_id))
            })?,
    };

    Ok(IdentityRecord {
        id: object.object_id.clone(),
        owner: owner.clone(),
        display_name,
        name_change_count,
    })
}
