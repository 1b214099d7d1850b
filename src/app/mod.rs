//! Application: built-in routes and the per-request capture pipeline

mod credentials;
mod router;

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response};
use serde_json::json;
use tracing::{debug, warn};

use crate::broadcast::event_stream_response;
use crate::capture::{CaptureService, RequestContext, ResponseSink};
use crate::config::Config;
use crate::network::{HttpHandler, ResponseBody};

pub use credentials::{
    issue_token, parse_basic_auth, CredentialStore, Credentials, TOKEN_EXPIRES_IN,
};
pub use router::{Handler, Router};

/// Path of the credential configuration endpoints
pub const CONFIG_PATH: &str = "/config";

/// Path of the token exchange endpoint
pub const TOKEN_PATH: &str = "/obter-token";

/// Path of the always-failing token endpoint
pub const TOKEN_ERROR_PATH: &str = "/obter-token/erro";

/// Capturing HTTP application
#[derive(Debug)]
pub struct App {
    config: Arc<Config>,
    capture: Arc<CaptureService>,
    credentials: Arc<CredentialStore>,
    router: Router,
}

impl App {
    /// Create the application with its built-in routes
    #[must_use]
    pub fn new(config: Config) -> Self {
        let capture = Arc::new(CaptureService::new(&config.capture));
        let credentials = Arc::new(CredentialStore::new(&config.credentials));
        let mut router = Router::new();

        let service = Arc::clone(&capture);
        router.add(
            Method::POST,
            config.capture.clear_path.clone(),
            move |_: &RequestContext, sink: &mut ResponseSink| {
                service.clear();
                sink.json(json!({"ok": true}));
            },
        );

        let store = Arc::clone(&credentials);
        router.add(Method::GET, CONFIG_PATH, move |request: &RequestContext, sink: &mut ResponseSink| {
            store.show(request, sink);
        });

        let store = Arc::clone(&credentials);
        router.add(Method::POST, CONFIG_PATH, move |request: &RequestContext, sink: &mut ResponseSink| {
            store.replace(request, sink);
        });

        let store = Arc::clone(&credentials);
        router.add(Method::POST, TOKEN_PATH, move |request: &RequestContext, sink: &mut ResponseSink| {
            store.exchange(request, sink);
        });

        let store = Arc::clone(&credentials);
        router.add(
            Method::POST,
            TOKEN_ERROR_PATH,
            move |request: &RequestContext, sink: &mut ResponseSink| {
                store.failure(request, sink);
            },
        );

        Self {
            config: Arc::new(config),
            capture,
            credentials,
            router,
        }
    }

    /// Register an additional handler
    #[must_use]
    pub fn route(mut self, method: Method, path: &str, handler: impl Handler + 'static) -> Self {
        self.router.add(method, path, handler);
        self
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared capture service
    #[must_use]
    pub fn capture(&self) -> &Arc<CaptureService> {
        &self.capture
    }

    /// Shared credential store
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Serve one request
    ///
    /// The event stream endpoint is answered directly. Everything else is
    /// captured on arrival, dispatched through a `ResponseSink`, and
    /// finalized on the handler's first emission.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Display,
    {
        let started = Instant::now();
        let capture_config = &self.config.capture;

        if request.method() == Method::GET && request.uri().path() == capture_config.events_path {
            return event_stream_response(&self.capture, capture_config.keepalive());
        }

        let limits = &self.config.limits;
        let checked =
            HttpHandler::validate_request(&request, limits.max_request_size, limits.max_headers);
        let (parts, body) = request.into_parts();
        let body = match checked {
            Ok(()) => HttpHandler::read_body(body, limits.max_request_size).await,
            Err(e) => Err(e),
        };
        let (bytes, rejection) = match body {
            Ok(bytes) => (bytes, None),
            Err(e) => (Bytes::new(), Some(e)),
        };

        let request = RequestContext::capture(&parts.method, &parts.uri, &parts.headers, &bytes);
        let mut sink = if self.capture.is_loggable(&request.route_path) {
            ResponseSink::capturing(Arc::clone(&self.capture), request.info.clone(), started)
        } else {
            ResponseSink::passthrough()
        };

        match rejection {
            Some(error) => {
                warn!("Rejected {} {}: {}", request.method, request.info.path, error);
                sink.status(HttpHandler::error_status(&error));
                sink.send(format!("Error: {error}"));
            }
            None => {
                self.router.dispatch(&request, &mut sink);
            }
        }

        if sink.is_capture_pending() {
            debug!("{} {} finished without emitting", request.method, request.info.path);
        }

        sink.into_response()
    }
}
