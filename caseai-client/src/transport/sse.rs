//! Push transport over the server's SSE feed

use super::{Backoff, FeedTransport};
use crate::api_client::ApiClient;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use caseai_common::sse::{ReconnectHint, EVENT_CONNECTED, EVENT_MESSAGE, EVENT_RECONNECT};
use caseai_common::{Message, SessionId, SessionStatus};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One decoded SSE event from the feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected,
    Message(Box<Message>),
    Reconnect(ReconnectHint),
}

/// Decode an SSE event by name; unknown names are skipped
pub fn parse_feed_event(event: &str, data: &str) -> Result<Option<FeedEvent>> {
    match event {
        EVENT_CONNECTED => Ok(Some(FeedEvent::Connected)),
        EVENT_MESSAGE => serde_json::from_str::<Message>(data)
            .map(|m| Some(FeedEvent::Message(Box::new(m))))
            .map_err(|e| ClientError::InvalidResponse(format!("bad message event: {}", e))),
        EVENT_RECONNECT => serde_json::from_str::<ReconnectHint>(data)
            .map(|h| Some(FeedEvent::Reconnect(h)))
            .map_err(|e| ClientError::InvalidResponse(format!("bad reconnect event: {}", e))),
        _ => Ok(None),
    }
}

/// Why one stream connection ended
enum StreamEnd {
    /// Receiver dropped; stop for good
    ReceiverGone,
    /// Server closed the stream or asked us to reconnect
    Closed,
}

pub struct SseTransport {
    api: ApiClient,
    backoff: Backoff,
}

impl SseTransport {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Consume one stream connection, advancing `last_seen_id` per message
    async fn consume(
        &self,
        session: SessionId,
        last_seen_id: &mut Option<i64>,
        tx: &mpsc::Sender<Message>,
        backoff: &mut Backoff,
    ) -> Result<StreamEnd> {
        let response = self.api.open_stream(session, *last_seen_id).await?;
        let mut events = response.bytes_stream().eventsource();

        while let Some(item) = events.next().await {
            let event = item.map_err(|e| ClientError::InvalidResponse(format!("SSE stream error: {}", e)))?;

            match parse_feed_event(&event.event, &event.data)? {
                Some(FeedEvent::Connected) => {
                    debug!("Feed {}: connected", session);
                    backoff.reset();
                }
                Some(FeedEvent::Message(message)) => {
                    *last_seen_id = Some(message.message_id);
                    if tx.send(*message).await.is_err() {
                        return Ok(StreamEnd::ReceiverGone);
                    }
                }
                Some(FeedEvent::Reconnect(hint)) => {
                    info!("Feed {}: server requested reconnect ({})", session, hint.reason);
                    return Ok(StreamEnd::Closed);
                }
                None => debug!("Feed {}: ignoring event {:?}", session, event.event),
            }
        }

        Ok(StreamEnd::Closed)
    }
}

#[async_trait]
impl FeedTransport for SseTransport {
    async fn run(&self, session: SessionId, last_seen_id: Option<i64>, tx: mpsc::Sender<Message>) -> Result<()> {
        let mut last_seen_id = last_seen_id;
        let mut backoff = self.backoff.clone();

        loop {
            match self.consume(session, &mut last_seen_id, &tx, &mut backoff).await {
                Ok(StreamEnd::ReceiverGone) => return Ok(()),
                Ok(StreamEnd::Closed) => {
                    // A clean close after the session ended is the end of the feed
                    match self.api.get_session(session).await {
                        Ok(s) if s.status == SessionStatus::Ended => {
                            info!("Feed {}: session ended", session);
                            return Ok(());
                        }
                        Ok(_) => {}
                        Err(e) if e.is_rejection() => return Err(e),
                        Err(e) => warn!("Feed {}: could not check session: {}", session, e),
                    }
                }
                Err(e) if e.is_rejection() => return Err(e),
                Err(e) => warn!("Feed {}: stream failed: {}", session, e),
            }

            if tx.is_closed() {
                return Ok(());
            }
            let delay = backoff.next_delay();
            debug!("Feed {}: reconnecting after {:?} from {:?}", session, delay, last_seen_id);
            tokio::time::sleep(delay).await;
        }
    }
}
