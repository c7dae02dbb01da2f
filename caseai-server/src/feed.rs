//! Conversation Feed
//!
//! Delivers every message of a session exactly once and in order to one
//! subscriber. The store is the source of truth: notifications only wake the
//! feed up, and every wake-up re-queries the store for rows after the cursor.
//!
//! Subscription order matters: the listener is registered before the replay
//! query runs, so a message stored between replay and live mode still
//! produces a wake-up.

use crate::db;
use crate::notifier::{ChangeNotifier, ListenError};
use caseai_common::config::FeedSection;
use caseai_common::{Error, Message, OrderKey, Result, SessionId, SessionStatus};
use futures::stream::Stream;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What woke the live loop up
enum Wake {
    Hint(i64),
    Lagged(u64),
    Closed,
    Tick,
}

/// Ordered, gap-free message delivery per session
#[derive(Clone)]
pub struct ConversationFeed {
    pool: SqlitePool,
    notifier: Arc<ChangeNotifier>,
    config: FeedSection,
}

impl ConversationFeed {
    pub fn new(pool: SqlitePool, notifier: Arc<ChangeNotifier>, config: FeedSection) -> Self {
        Self {
            pool,
            notifier,
            config,
        }
    }

    /// Resolve a client's `last_seen_id` into a replay cursor
    ///
    /// An id that does not belong to the session is rejected rather than
    /// silently replaying from the start.
    pub async fn resolve_cursor(
        &self,
        session: SessionId,
        last_seen_id: Option<i64>,
    ) -> Result<Option<OrderKey>> {
        let Some(id) = last_seen_id else {
            return Ok(None);
        };
        match db::messages::order_key_of(&self.pool, session, id).await? {
            Some(key) => Ok(Some(key)),
            None => Err(Error::Validation(format!(
                "message {} does not belong to session {}",
                id, session
            ))),
        }
    }

    /// Stored messages after `cursor` (pull strategy), retried on storage errors
    pub async fn fetch_after(
        &self,
        session: SessionId,
        cursor: Option<OrderKey>,
    ) -> Result<Vec<Message>> {
        fetch_with_retry(&self.pool, &self.config, session, cursor).await
    }

    /// Live feed: replay after `cursor`, then live delivery
    ///
    /// The stream yields an error and ends when storage stays unavailable
    /// after all retries, or ends cleanly once the session has ended.
    pub fn subscribe(
        &self,
        session: SessionId,
        cursor: Option<OrderKey>,
    ) -> impl Stream<Item = Result<Message>> + Send + 'static {
        let pool = self.pool.clone();
        let notifier = Arc::clone(&self.notifier);
        let config = self.config.clone();

        async_stream::stream! {
            let channel = session.channel();
            let mut cursor = cursor;
            let mut ticker = tokio::time::interval(config.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Feed: subscribed to session {}", session);

            'resubscribe: loop {
                let mut listener = notifier.listen(&channel);

                // Replay covers anything stored while we were not listening
                match fetch_with_retry(&pool, &config, session, cursor).await {
                    Ok(batch) => {
                        for message in batch {
                            cursor = Some(message.order_key());
                            yield Ok(message);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }

                if session_ended(&pool, session).await {
                    info!("Feed: session {} has ended, replay complete", session);
                    return;
                }

                loop {
                    let wake = tokio::select! {
                        hint = listener.recv() => match hint {
                            Ok(hint) => Wake::Hint(hint.message_id),
                            Err(ListenError::Lagged(n)) => Wake::Lagged(n),
                            Err(ListenError::Closed) => Wake::Closed,
                        },
                        _ = ticker.tick() => Wake::Tick,
                    };

                    match wake {
                        Wake::Hint(id) => debug!("Feed {}: hint for message {}", session, id),
                        Wake::Lagged(n) => debug!("Feed {}: lagged by {} hints", session, n),
                        Wake::Tick | Wake::Closed => {
                            if session_ended(&pool, session).await {
                                info!("Feed: session {} ended", session);
                                // Deliver anything stored right before the end
                                if let Ok(batch) = fetch_with_retry(&pool, &config, session, cursor).await {
                                    for message in batch {
                                        yield Ok(message);
                                    }
                                }
                                return;
                            }
                            if matches!(wake, Wake::Closed) {
                                warn!("Feed {}: notification channel closed, resubscribing", session);
                                continue 'resubscribe;
                            }
                        }
                    }

                    match fetch_with_retry(&pool, &config, session, cursor).await {
                        Ok(batch) => {
                            for message in batch {
                                cursor = Some(message.order_key());
                                yield Ok(message);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn session_ended(pool: &SqlitePool, session: SessionId) -> bool {
    match db::sessions::get_session(pool, session).await {
        Ok(Some(s)) => s.status == SessionStatus::Ended,
        Ok(None) => true,
        Err(e) => {
            warn!("Feed {}: could not check session status: {}", session, e);
            false
        }
    }
}

/// Query with exponential backoff on storage errors only
async fn fetch_with_retry(
    pool: &SqlitePool,
    config: &FeedSection,
    session: SessionId,
    cursor: Option<OrderKey>,
) -> Result<Vec<Message>> {
    let mut attempt = 0;
    loop {
        match db::messages::query_messages(pool, session, cursor).await {
            Ok(batch) => return Ok(batch),
            Err(Error::Storage(e)) if attempt < config.retry_attempts => {
                let delay = config.retry_delay(attempt);
                warn!(
                    "Feed {}: storage error (attempt {}), retrying in {:?}: {}",
                    session,
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
