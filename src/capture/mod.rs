//! Capture pipeline: request capture, finalize-once response sink, and the
//! service that owns history and subscribers

mod request;
mod service;
mod sink;

pub use request::{parse_urlencoded, RequestContext};
pub use service::{CaptureService, Subscription};
pub use sink::{Payload, ResponseSink};
