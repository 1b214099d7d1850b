//! Toy client-credentials exchange and the key-value store behind it

use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use hyper::header::AUTHORIZATION;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::capture::{RequestContext, ResponseSink};
use crate::config::CredentialsConfig;
use crate::record::unique_suffix;

/// Lifetime advertised for issued tokens, in seconds
pub const TOKEN_EXPIRES_IN: u64 = 7200;

/// Client id and secret pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Client id
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

/// Mutable credential store consulted by the token endpoints
#[derive(Debug)]
pub struct CredentialStore {
    current: RwLock<Credentials>,
}

impl CredentialStore {
    /// Create a store seeded from configuration
    #[must_use]
    pub fn new(config: &CredentialsConfig) -> Self {
        Self {
            current: RwLock::new(Credentials {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            }),
        }
    }

    /// Current credentials
    #[must_use]
    pub fn get(&self) -> Credentials {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the fields given as non-blank strings
    pub fn update(&self, client_id: Option<&str>, client_secret: Option<&str>) -> Credentials {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = client_id.filter(|id| !id.trim().is_empty()) {
            current.client_id = id.to_string();
        }
        if let Some(secret) = client_secret.filter(|secret| !secret.trim().is_empty()) {
            current.client_secret = secret.to_string();
        }

        current.clone()
    }

    /// Whether the pair matches the stored credentials
    #[must_use]
    pub fn verify(&self, client_id: &str, client_secret: &str) -> bool {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current.client_id == client_id && current.client_secret == client_secret
    }

    /// `GET /config`
    pub fn show(&self, _request: &RequestContext, sink: &mut ResponseSink) {
        let current = self.get();
        sink.json(json!({
            "client_id": current.client_id,
            "client_secret": current.client_secret,
        }));
    }

    /// `POST /config`
    pub fn replace(&self, request: &RequestContext, sink: &mut ResponseSink) {
        let updated = self.update(
            request.body_str("client_id"),
            request.body_str("client_secret"),
        );
        info!("Credentials updated for client {}", updated.client_id);

        sink.json(json!({"ok": true, "client_id": updated.client_id}));
    }

    /// `POST /obter-token`
    pub fn exchange(&self, request: &RequestContext, sink: &mut ResponseSink) {
        info!("Token request received: {}", request.info.body);

        let mut client_id = request.body_str("client_id").map(str::to_string);
        let mut client_secret = request.body_str("client_secret").map(str::to_string);

        if client_id.is_none() || client_secret.is_none() {
            if let Some((id, secret)) = request.header(AUTHORIZATION.as_str()).and_then(parse_basic_auth) {
                client_id.get_or_insert(id);
                client_secret.get_or_insert(secret);
            }
        }

        let valid = match (&client_id, &client_secret) {
            (Some(id), Some(secret)) => self.verify(id, secret),
            _ => false,
        };

        if !valid {
            sink.status(StatusCode::UNAUTHORIZED);
            sink.json(json!({
                "error": "invalid_client",
                "error_description": "client_id or client_secret is invalid",
            }));
            return;
        }

        let token = issue_token(client_id.as_deref().unwrap_or_default());
        sink.json(json!({
            "access_token": token,
            "expires_in": TOKEN_EXPIRES_IN,
            "token_type": "Bearer",
        }));
    }

    /// `POST /obter-token/erro`
    pub fn failure(&self, request: &RequestContext, sink: &mut ResponseSink) {
        info!("Token error request received: {}", request.info.body);

        sink.status(StatusCode::BAD_REQUEST);
        sink.json(json!({
            "message": "Error processing the request",
            "error": "Bad Request",
        }));
    }
}

/// Parse `Basic base64(id:secret)`
#[must_use]
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") || token.is_empty() {
        return None;
    }

    let decoded = STANDARD.decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Opaque bearer token for a client
#[must_use]
pub fn issue_token(client_id: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    STANDARD_NO_PAD.encode(format!("{client_id}:{millis}:{}", unique_suffix()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::body::Bytes;
    use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use hyper::{Method, Uri};
    use serde_json::Value;

    fn store() -> CredentialStore {
        CredentialStore::new(&CredentialsConfig::default())
    }

    fn post(uri: &str, headers: HeaderMap, body: &'static [u8]) -> RequestContext {
        let uri: Uri = uri.parse().unwrap();
        RequestContext::capture(&Method::POST, &uri, &headers, &Bytes::from_static(body))
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    async fn respond(sink: ResponseSink) -> (StatusCode, Value) {
        let response = sink.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_update_ignores_blank_values() {
        let store = store();
        let updated = store.update(Some("new-id"), Some("  "));

        assert_eq!(updated.client_id, "new-id");
        assert_eq!(updated.client_secret, "my-secret");
        assert!(store.verify("new-id", "my-secret"));
    }

    #[test]
    fn test_parse_basic_auth() {
        let header = format!("Basic {}", STANDARD.encode("id:se:cret"));
        assert_eq!(
            parse_basic_auth(&header),
            Some(("id".to_string(), "se:cret".to_string()))
        );

        assert_eq!(parse_basic_auth("Bearer abc"), None);
        assert_eq!(parse_basic_auth("Basic"), None);
        assert_eq!(parse_basic_auth("basic !!!"), None);
        assert_eq!(parse_basic_auth(&format!("Basic {}", STANDARD.encode("nocolon"))), None);
    }

    #[test]
    fn test_issue_token_unpadded() {
        let token = issue_token("my-client");
        assert!(!token.ends_with('='));

        let decoded = String::from_utf8(STANDARD_NO_PAD.decode(&token).unwrap()).unwrap();
        assert!(decoded.starts_with("my-client:"));
        assert_eq!(decoded.split(':').count(), 3);
    }

    #[tokio::test]
    async fn test_exchange_with_body_credentials() {
        let store = store();
        let request = post(
            "/obter-token",
            json_headers(),
            br#"{"client_id":"my-client","client_secret":"my-secret"}"#,
        );

        let mut sink = ResponseSink::passthrough();
        store.exchange(&request, &mut sink);
        let (status, body) = respond(sink).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 7200);
        assert!(body["access_token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_exchange_with_basic_auth() {
        let store = store();
        let mut headers = HeaderMap::new();
        let basic = format!("Basic {}", STANDARD.encode("my-client:my-secret"));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&basic).unwrap());
        let request = post("/obter-token", headers, b"");

        let mut sink = ResponseSink::passthrough();
        store.exchange(&request, &mut sink);
        let (status, _) = respond(sink).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_exchange_rejects_bad_secret() {
        let store = store();
        let request = post(
            "/obter-token",
            json_headers(),
            br#"{"client_id":"my-client","client_secret":"wrong"}"#,
        );

        let mut sink = ResponseSink::passthrough();
        store.exchange(&request, &mut sink);
        let (status, body) = respond(sink).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_client");
    }

    #[tokio::test]
    async fn test_failure_endpoint() {
        let store = store();
        let mut sink = ResponseSink::passthrough();
        store.failure(&post("/obter-token/erro", HeaderMap::new(), b""), &mut sink);
        let (status, body) = respond(sink).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad Request");
    }
}
