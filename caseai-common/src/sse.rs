//! Server-Sent Events (SSE) utilities
//!
//! Event names and encoders shared by the feed endpoint and its consumers.

use crate::models::Message;
use axum::response::sse::{Event, KeepAlive};
use std::time::Duration;
use tracing::warn;

/// Sent once when a stream opens
pub const EVENT_CONNECTED: &str = "connected";
/// One stored message; SSE `id` is the message id
pub const EVENT_MESSAGE: &str = "message";
/// Server gave up; client should reconnect passing `last_seen_id`
pub const EVENT_RECONNECT: &str = "reconnect";

/// Payload of a [`EVENT_RECONNECT`] event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReconnectHint {
    pub last_seen_id: Option<i64>,
    pub reason: String,
}

/// Encode a stored message as an SSE event
///
/// Returns None (and logs) if the message cannot be serialized.
pub fn message_event(message: &Message) -> Option<Event> {
    match Event::default()
        .event(EVENT_MESSAGE)
        .id(message.message_id.to_string())
        .json_data(message)
    {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to serialize message {}: {}", message.message_id, e);
            None
        }
    }
}

pub fn connected_event() -> Event {
    Event::default().event(EVENT_CONNECTED).data("connected")
}

pub fn reconnect_event(hint: &ReconnectHint) -> Event {
    Event::default()
        .event(EVENT_RECONNECT)
        .json_data(hint)
        .unwrap_or_else(|_| Event::default().event(EVENT_RECONNECT).data("{}"))
}

/// Keep-alive comments so proxies don't drop idle feeds
pub fn keep_alive(interval_secs: u64) -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(interval_secs.max(1)))
        .text("heartbeat")
}
