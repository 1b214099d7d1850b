//! Request-side capture: turns an inbound request into a `RequestInfo`

use std::collections::BTreeMap;

use hyper::body::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Method, Uri};
use serde_json::{Map, Value};

use crate::record::RequestInfo;

/// Inbound request as seen by handlers
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method
    pub method: Method,
    /// Path without query string, used for routing
    pub route_path: String,
    /// Captured request data
    pub info: RequestInfo,
}

impl RequestContext {
    /// Capture a request from its parts and collected body
    #[must_use]
    pub fn capture(method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        let info = RequestInfo {
            method: method.as_str().to_string(),
            path: uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), ToString::to_string),
            headers: capture_headers(headers),
            query: uri.query().map(parse_urlencoded).unwrap_or_default(),
            body: parse_body(content_type, body),
        };

        Self {
            method: method.clone(),
            route_path: uri.path().to_string(),
            info,
        }
    }

    /// Header value by lowercase name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.info.headers.get(name).map(String::as_str)
    }

    /// String field of a JSON or form body
    #[must_use]
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.info.body.get(field).and_then(Value::as_str)
    }
}

/// Copy every header; repeated names are joined with ", "
fn capture_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut captured: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        captured
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }

    captured
}

/// Parse `a=1&b=2&b=3` into `{"a": "1", "b": ["2", "3"]}`
#[must_use]
pub fn parse_urlencoded(input: &str) -> Map<String, Value> {
    let mut params = Map::new();

    for pair in input.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = Value::String(decode_component(value));

        match params.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key, value);
            }
        }
    }

    params
}

fn decode_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Parse a request body according to its content type
///
/// An empty body is `{}`. JSON that does not parse is kept as text.
fn parse_body(content_type: Option<&str>, body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Object(Map::new());
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let text = String::from_utf8_lossy(body);

    if mime == "application/json" || mime.ends_with("+json") {
        serde_json::from_slice(body).unwrap_or_else(|_| Value::String(text.into_owned()))
    } else if mime == "application/x-www-form-urlencoded" {
        Value::Object(parse_urlencoded(&text))
    } else {
        Value::String(text.into_owned())
    }
}
