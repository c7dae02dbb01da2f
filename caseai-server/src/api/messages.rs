//! Message submission and the pull (polling) feed

use super::handlers::SessionQuery;
use crate::db;
use crate::error::ApiResult;
use crate::ingest::SubmitMessage;
use crate::state::AppContext;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use caseai_common::Message;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub started_case_id: Option<String>,
    pub after_id: Option<i64>,
}

/// POST /api/messages
pub async fn submit_message(
    State(ctx): State<AppContext>,
    payload: Result<Json<SubmitMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let Json(request) = payload?;
    let message = ctx.ingest.submit(request).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages?started_case_id=&after_id=
///
/// Messages after `after_id` in order-key order; the whole transcript when
/// `after_id` is absent.
pub async fn list_messages(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let session = SessionQuery {
        started_case_id: query.started_case_id,
    }
    .session_id()?;
    db::sessions::require_session(&ctx.db_pool, session).await?;

    let cursor = ctx.feed.resolve_cursor(session, query.after_id).await?;
    let messages = ctx.feed.fetch_after(session, cursor).await?;
    debug!(
        "Poll {}: {} messages after {:?}",
        session,
        messages.len(),
        query.after_id
    );

    Ok(Json(messages))
}
