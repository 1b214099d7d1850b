//! Transaction records captured for every finalized request/response pair

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Sequence mixed into every generated suffix
static NONCE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// How a response was emitted by its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Structured emission (a JSON value)
    Json,
    /// Raw emission (text or bytes)
    Send,
}

/// Request half of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Original URL, query string included
    pub path: String,
    /// Inbound headers
    pub headers: BTreeMap<String, String>,
    /// Parsed query parameters
    pub query: serde_json::Map<String, Value>,
    /// Parsed request body
    pub body: Value,
}

/// Response half of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// HTTP status code
    pub status: u16,
    /// Emission kind
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    /// Response body as seen by observers
    pub body: Value,
}

/// Immutable summary of one request/response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Unique id: `<unix-millis>-<hex suffix>`
    pub id: String,
    /// RFC 3339 creation time, millisecond precision
    pub timestamp: String,
    /// Time from request arrival to finalization
    pub duration_ms: u64,
    /// Captured request
    pub request: RequestInfo,
    /// Captured response
    pub response: ResponseInfo,
}

impl TransactionRecord {
    /// Build a record stamped with the current time
    #[must_use]
    pub fn new(request: RequestInfo, response: ResponseInfo, elapsed: Duration) -> Self {
        let now = SystemTime::now();
        let timestamp: DateTime<Utc> = now.into();

        Self {
            id: generate_record_id(now),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            request,
            response,
        }
    }
}

/// Generate a record id from a creation time
fn generate_record_id(now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    format!("{millis}-{}", unique_suffix())
}

/// Short hex suffix, distinct for every call within a process
///
/// Hashes the nanosecond clock together with a process-wide sequence so
/// calls landing on the same clock tick still differ.
#[must_use]
pub fn unique_suffix() -> String {
    let mut hasher = Sha256::new();

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    hasher.update(nanos.to_le_bytes());
    hasher.update(NONCE_SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());

    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

/// Decode a binary response body for display in a record
///
/// Valid UTF-8 becomes a string. Anything else is kept as the raw byte
/// values so nothing is lost.
#[must_use]
pub fn decode_binary_body(bytes: &Bytes) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
