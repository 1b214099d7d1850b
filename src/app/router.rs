//! Route table dispatching requests to handlers

use std::fmt;
use std::sync::Arc;

use hyper::{Method, StatusCode};

use crate::capture::{RequestContext, ResponseSink};

/// Request handler
///
/// Handlers write their response through the sink and never see whether
/// the request is being captured.
pub trait Handler: Send + Sync {
    /// Handle one request
    fn call(&self, request: &RequestContext, sink: &mut ResponseSink);
}

impl<F> Handler for F
where
    F: Fn(&RequestContext, &mut ResponseSink) + Send + Sync,
{
    fn call(&self, request: &RequestContext, sink: &mut ResponseSink) {
        self(request, sink);
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Arc<dyn Handler>,
}

/// Exact-match route table
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| format!("{} {}", r.method, r.path)))
            .finish()
    }
}

impl Router {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; later registrations for the same route win
    pub fn add(&mut self, method: Method, path: impl Into<String>, handler: impl Handler + 'static) {
        let path = path.into();
        self.routes
            .retain(|route| !(route.method == method && route.path == path));
        self.routes.push(Route {
            method,
            path,
            handler: Arc::new(handler),
        });
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run the matching handler, or answer 404
    ///
    /// Returns whether a route matched.
    pub fn dispatch(&self, request: &RequestContext, sink: &mut ResponseSink) -> bool {
        let matched = self
            .routes
            .iter()
            .find(|route| route.method == request.method && route.path == request.route_path);

        match matched {
            Some(route) => {
                route.handler.call(request, sink);
                true
            }
            None => {
                sink.status(StatusCode::NOT_FOUND);
                sink.send(format!("Cannot {} {}", request.method, request.route_path));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::body::Bytes;
    use hyper::header::HeaderMap;
    use hyper::Uri;
    use serde_json::json;

    fn request(method: Method, uri: &str) -> RequestContext {
        let uri: Uri = uri.parse().unwrap();
        RequestContext::capture(&method, &uri, &HeaderMap::new(), &Bytes::new())
    }

    #[tokio::test]
    async fn test_dispatch_matches_method_and_path() {
        let mut router = Router::new();
        router.add(Method::GET, "/ping", |_: &RequestContext, sink: &mut ResponseSink| {
            sink.json(json!({"pong": true}));
        });

        let mut sink = ResponseSink::passthrough();
        assert!(router.dispatch(&request(Method::GET, "/ping?x=1"), &mut sink));
        let body = sink.into_response().into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from(r#"{"pong":true}"#));

        let mut sink = ResponseSink::passthrough();
        assert!(!router.dispatch(&request(Method::POST, "/ping"), &mut sink));
        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("Cannot POST /ping"));
    }

    #[test]
    fn test_add_replaces_existing_route() {
        let mut router = Router::new();
        router.add(Method::GET, "/a", |_: &RequestContext, sink: &mut ResponseSink| sink.send("one"));
        router.add(Method::GET, "/a", |_: &RequestContext, sink: &mut ResponseSink| sink.send("two"));
        router.add(Method::POST, "/a", |_: &RequestContext, sink: &mut ResponseSink| sink.send("three"));

        assert_eq!(router.len(), 2);
        assert!(!router.is_empty());
    }
}
