//! Feed transports
//!
//! A transport pulls a session's messages from the server and forwards them
//! in order. It tracks its own resume point and reconnects from it, so the
//! consumer only ever sees duplicates (which the transcript drops), never
//! gaps.

pub mod poll;
pub mod sse;

use crate::error::Result;
use async_trait::async_trait;
use caseai_common::{Message, SessionId};
use std::time::Duration;
use tokio::sync::mpsc;

pub use poll::PollingTransport;
pub use sse::{FeedEvent, SseTransport};

#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Forward messages after `last_seen_id` into `tx`
    ///
    /// Returns `Ok(())` once the session has ended or the receiver is gone.
    async fn run(&self, session: SessionId, last_seen_id: Option<i64>, tx: mpsc::Sender<Message>) -> Result<()>;
}

/// Doubling delay between reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait now; the next one doubles up to `max`
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(10))
    }
}
