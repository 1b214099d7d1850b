//! Live fan-out of captured records to event stream subscribers

mod events;
mod hub;

pub use events::{encode_event, event_stream_response, EventStream, StreamState, KEEPALIVE_FRAME};
pub use hub::{BroadcastHub, RecordSender, SubscriberId};
