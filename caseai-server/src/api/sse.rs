//! Push feed: Server-Sent Events stream of a session's messages

use super::handlers::SessionQuery;
use crate::db;
use crate::error::ApiResult;
use crate::state::AppContext;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use caseai_common::sse::{connected_event, keep_alive, message_event, reconnect_event, ReconnectHint};
use caseai_common::Error;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub started_case_id: Option<String>,
    pub last_seen_id: Option<i64>,
}

/// Standard SSE resume header
fn last_event_id(headers: &HeaderMap) -> caseai_common::Result<Option<i64>> {
    let Some(value) = headers.get("last-event-id") else {
        return Ok(None);
    };
    let text = value
        .to_str()
        .map_err(|_| Error::Validation("Last-Event-ID is not valid text".to_string()))?;
    text.trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|_| Error::Validation(format!("Last-Event-ID is not a message id: {}", text)))
}

/// GET /api/messages/stream?started_case_id=&last_seen_id=
///
/// Emits `connected`, then one `message` event per stored message (replay
/// first, then live). If the feed gives up on storage, a final `reconnect`
/// event tells the client where to resume.
pub async fn message_stream(
    State(ctx): State<AppContext>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session = SessionQuery {
        started_case_id: query.started_case_id,
    }
    .session_id()?;

    // The query parameter wins over the header
    let last_seen = match query.last_seen_id {
        Some(id) => Some(id),
        None => last_event_id(&headers)?,
    };

    db::sessions::require_session(&ctx.db_pool, session).await?;
    let cursor = ctx.feed.resolve_cursor(session, last_seen).await?;
    info!("SSE client connected to session {} (last_seen_id {:?})", session, last_seen);

    let mut feed = Box::pin(ctx.feed.subscribe(session, cursor));

    let stream = async_stream::stream! {
        yield Ok::<Event, Infallible>(connected_event());

        let mut last_seen_id = last_seen;
        while let Some(item) = feed.next().await {
            match item {
                Ok(message) => {
                    last_seen_id = Some(message.message_id);
                    if let Some(event) = message_event(&message) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    warn!("SSE feed for session {} failed: {}", session, e);
                    yield Ok(reconnect_event(&ReconnectHint {
                        last_seen_id,
                        reason: e.to_string(),
                    }));
                    break;
                }
            }
        }

        debug!("SSE stream for session {} finished", session);
    };

    Ok(Sse::new(stream).keep_alive(keep_alive(ctx.config.feed.keep_alive_secs)))
}
