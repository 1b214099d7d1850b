//! Server-Sent Events endpoint: history replay followed by live records

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::capture::{CaptureService, Subscription};
use crate::network::ResponseBody;
use crate::record::TransactionRecord;

/// Comment frame sent on idle streams
pub const KEEPALIVE_FRAME: &[u8] = b": keep-alive\n\n";

/// Lifecycle of one event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepted, not yet subscribed
    Connecting,
    /// Delivering the history snapshot
    ReplayingHistory,
    /// Delivering live records
    Live,
    /// Finished; nothing more is written
    Closed,
}

/// Encode a record as one SSE `data:` frame
///
/// # Errors
///
/// Returns error if the record cannot be serialized
pub fn encode_event(record: &TransactionRecord) -> serde_json::Result<Bytes> {
    let json = serde_json::to_vec(record)?;

    let mut frame = Vec::with_capacity(json.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");
    Ok(Bytes::from(frame))
}

/// One subscriber's view of the capture stream
#[derive(Debug)]
pub struct EventStream {
    state: StreamState,
    subscription: Option<Subscription>,
    history_remaining: usize,
    keepalive: Option<Interval>,
}

impl EventStream {
    /// Subscribe to the capture service
    ///
    /// The stream starts closed if the service is shutting down.
    #[must_use]
    pub fn open(service: &CaptureService, keepalive: Option<Duration>) -> Self {
        let mut stream = Self {
            state: StreamState::Connecting,
            subscription: None,
            history_remaining: 0,
            keepalive: keepalive.map(|period| {
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            }),
        };

        match service.subscribe() {
            Some(subscription) => {
                stream.history_remaining = subscription.history_len();
                debug!(
                    "{} connected, replaying {} records",
                    subscription.id(),
                    stream.history_remaining
                );
                stream.subscription = Some(subscription);
                stream.state = if stream.history_remaining > 0 {
                    StreamState::ReplayingHistory
                } else {
                    StreamState::Live
                };
            }
            None => stream.state = StreamState::Closed,
        }

        stream
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Next frame to write; `None` once the stream is closed
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let subscription = self.subscription.as_mut()?;

            let received = match self.keepalive.as_mut() {
                Some(keepalive) => tokio::select! {
                    biased;
                    received = subscription.recv() => received,
                    _ = keepalive.tick() => return Some(Bytes::from_static(KEEPALIVE_FRAME)),
                },
                None => subscription.recv().await,
            };

            let Some(record) = received else {
                self.close();
                return None;
            };

            self.advance();
            match encode_event(&record) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!("Skipping record {}: {}", record.id, e),
            }
        }
    }

    fn advance(&mut self) {
        if self.state == StreamState::ReplayingHistory {
            self.history_remaining -= 1;
            if self.history_remaining == 0 {
                self.state = StreamState::Live;
            }
        }
    }

    /// Leave the hub; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!("{} closed", subscription.id());
        }
        self.state = StreamState::Closed;
    }

    /// Build the streaming HTTP response for this subscriber
    ///
    /// # Panics
    ///
    /// Panics if response builder fails (should never happen with valid inputs)
    #[must_use]
    pub fn into_response(self) -> Response<ResponseBody> {
        let frames = stream::unfold(self, |mut events| async move {
            let frame = events.next_frame().await?;
            Some((Ok::<_, Infallible>(Frame::data(frame)), events))
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .header(CONNECTION, "keep-alive")
            .header("x-accel-buffering", "no")
            .body(StreamBody::new(frames).boxed_unsync())
            .expect("Failed to build response")
    }
}

/// Open an event stream response for a new subscriber
#[must_use]
pub fn event_stream_response(
    service: &Arc<CaptureService>,
    keepalive: Option<Duration>,
) -> Response<ResponseBody> {
    EventStream::open(service, keepalive).into_response()
}
