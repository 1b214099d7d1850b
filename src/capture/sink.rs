//! Response-side capture: the single emission path every handler uses

use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::Value;

use crate::network::ResponseBody;
use crate::record::{
    decode_binary_body, RequestInfo, ResponseInfo, ResponseKind, TransactionRecord,
};

use super::CaptureService;

/// Response payload handed to a sink
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured JSON value
    Json(Value),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Binary(Bytes),
}

impl Payload {
    /// Emission kind recorded for this payload
    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        match self {
            Payload::Json(_) => ResponseKind::Json,
            Payload::Text(_) | Payload::Binary(_) => ResponseKind::Send,
        }
    }

    /// Content type used when the handler did not set one
    fn content_type(&self) -> &'static str {
        match self {
            Payload::Json(_) => "application/json; charset=utf-8",
            Payload::Text(_) => "text/html; charset=utf-8",
            Payload::Binary(_) => "application/octet-stream",
        }
    }

    /// Bytes delivered to the caller
    fn to_bytes(&self) -> Bytes {
        match self {
            Payload::Json(value) => Bytes::from(value.to_string()),
            Payload::Text(text) => Bytes::from(text.clone()),
            Payload::Binary(bytes) => bytes.clone(),
        }
    }

    /// Body as stored in the record
    fn captured_body(&self) -> Value {
        match self {
            Payload::Json(value) => value.clone(),
            Payload::Text(text) => Value::String(text.clone()),
            Payload::Binary(bytes) => decode_binary_body(bytes),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(bytes))
    }
}

/// Capture waiting for the first emission
#[derive(Debug)]
struct PendingCapture {
    service: Arc<CaptureService>,
    request: RequestInfo,
    started: Instant,
}

/// Where a handler writes its response
///
/// Every emission is delivered to the caller. Only the first one, and only
/// for loggable requests, finalizes a `TransactionRecord`.
#[derive(Debug)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    delivered: Vec<Bytes>,
    emissions: usize,
    pending: Option<PendingCapture>,
}

impl ResponseSink {
    /// Sink that finalizes a record on first emission
    #[must_use]
    pub fn capturing(service: Arc<CaptureService>, request: RequestInfo, started: Instant) -> Self {
        Self {
            pending: Some(PendingCapture {
                service,
                request,
                started,
            }),
            ..Self::passthrough()
        }
    }

    /// Sink that delivers without capturing
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            delivered: Vec::new(),
            emissions: 0,
            pending: None,
        }
    }

    /// Set the response status
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Set a response header
    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Emit a payload to the caller
    ///
    /// The first call finalizes the capture synchronously; the record is in
    /// the history and published before this returns.
    pub fn emit(&mut self, payload: Payload) {
        if let Some(pending) = self.pending.take() {
            let response = ResponseInfo {
                status: self.status.as_u16(),
                kind: payload.kind(),
                body: payload.captured_body(),
            };
            let record = TransactionRecord::new(pending.request, response, pending.started.elapsed());
            pending.service.record(record);
        }

        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(payload.content_type()));
        }

        self.delivered.push(payload.to_bytes());
        self.emissions += 1;
    }

    /// Structured emission
    pub fn json(&mut self, value: Value) {
        self.emit(Payload::Json(value));
    }

    /// Raw emission
    pub fn send(&mut self, body: impl Into<Payload>) {
        self.emit(body.into());
    }

    /// Number of emissions so far
    #[must_use]
    pub fn emission_count(&self) -> usize {
        self.emissions
    }

    /// Whether this sink still has a capture to finalize
    #[must_use]
    pub fn is_capture_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Build the response delivered to the caller
    ///
    /// # Panics
    ///
    /// Panics if response builder fails (should never happen with valid inputs)
    #[must_use]
    pub fn into_response(self) -> Response<ResponseBody> {
        let body = match self.delivered.len() {
            0 => Bytes::new(),
            1 => self.delivered.into_iter().next().unwrap_or_default(),
            _ => Bytes::from(self.delivered.concat()),
        };

        let mut response = Response::builder()
            .status(self.status)
            .body(Full::new(body).boxed_unsync())
            .expect("Failed to build response");
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn service() -> Arc<CaptureService> {
        Arc::new(CaptureService::new(&CaptureConfig::default()))
    }

    fn request() -> RequestInfo {
        RequestInfo {
            method: "GET".to_string(),
            path: "/twice".to_string(),
            headers: BTreeMap::new(),
            query: serde_json::Map::new(),
            body: json!({}),
        }
    }

    async fn body_of(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_double_emission_records_once() {
        let service = service();
        let mut sink = ResponseSink::capturing(Arc::clone(&service), request(), Instant::now());

        sink.status(StatusCode::CREATED);
        sink.json(json!({"first": true}));
        sink.send("second");

        assert_eq!(sink.emission_count(), 2);
        assert!(!sink.is_capture_pending());

        let history = service.snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].response.status, 201);
        assert_eq!(history[0].response.kind, ResponseKind::Json);
        assert_eq!(history[0].response.body, json!({"first": true}));

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_of(response).await, Bytes::from(r#"{"first":true}second"#));
    }

    #[tokio::test]
    async fn test_passthrough_never_records() {
        let service = service();
        let mut sink = ResponseSink::passthrough();
        sink.json(json!({"ok": true}));

        assert!(service.is_empty());
        let response = sink.into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        assert_eq!(body_of(response).await, Bytes::from(r#"{"ok":true}"#));
    }

    #[tokio::test]
    async fn test_binary_body_decoded_for_record_only() {
        let service = service();
        let mut sink = ResponseSink::capturing(Arc::clone(&service), request(), Instant::now());
        let raw = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);

        sink.send(raw.clone());

        let history = service.snapshot();
        assert_eq!(history[0].response.kind, ResponseKind::Send);
        assert_eq!(history[0].response.body, json!([0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(body_of(sink.into_response()).await, raw);
    }

    #[tokio::test]
    async fn test_utf8_binary_body_recorded_as_text() {
        let service = service();
        let mut sink = ResponseSink::capturing(Arc::clone(&service), request(), Instant::now());

        sink.send(b"plain bytes".to_vec());

        assert_eq!(service.snapshot()[0].response.body, json!("plain bytes"));
    }

    #[tokio::test]
    async fn test_no_emission_no_record() {
        let service = service();
        let mut sink = ResponseSink::capturing(Arc::clone(&service), request(), Instant::now());
        sink.status(StatusCode::NO_CONTENT);

        let response = sink.into_response();
        assert!(service.is_empty());
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body_of(response).await.is_empty());
    }

    #[test]
    fn test_handler_content_type_wins() {
        let mut sink = ResponseSink::passthrough();
        sink.header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        sink.send("hi");

        let response = sink.into_response();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
    }
}
