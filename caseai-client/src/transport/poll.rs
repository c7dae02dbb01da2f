//! Pull transport: fixed-interval polling of the message list

use super::{Backoff, FeedTransport};
use crate::api_client::ApiClient;
use crate::error::Result;
use async_trait::async_trait;
use caseai_common::{Message, SessionId, SessionStatus};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct PollingTransport {
    api: ApiClient,
    interval: Duration,
}

impl PollingTransport {
    pub fn new(api: ApiClient, interval: Duration) -> Self {
        Self { api, interval }
    }
}

#[async_trait]
impl FeedTransport for PollingTransport {
    async fn run(&self, session: SessionId, last_seen_id: Option<i64>, tx: mpsc::Sender<Message>) -> Result<()> {
        let mut last_seen_id = last_seen_id;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = Backoff::new(self.interval, self.interval * 8);

        info!("Polling session {} every {:?}", session, self.interval);

        loop {
            ticker.tick().await;

            let batch = match self.api.list_messages(session, last_seen_id).await {
                Ok(batch) => {
                    backoff.reset();
                    batch
                }
                Err(e) if e.is_rejection() => return Err(e),
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("Poll {}: {} (retrying in {:?})", session, e, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            if batch.is_empty() {
                if tx.is_closed() {
                    return Ok(());
                }
                // Nothing new: stop once the session is over
                if let Ok(s) = self.api.get_session(session).await {
                    if s.status == SessionStatus::Ended {
                        // Rows stored between the poll and the end
                        for message in self.api.list_messages(session, last_seen_id).await? {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        info!("Poll {}: session ended", session);
                        return Ok(());
                    }
                }
                continue;
            }

            debug!("Poll {}: {} new messages", session, batch.len());
            for message in batch {
                last_seen_id = Some(message.message_id);
                if tx.send(message).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}
