//! Cases, sessions, personas and health endpoints

use crate::cast::DEFAULT_CAST;
use crate::db;
use crate::error::ApiResult;
use crate::state::AppContext;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use caseai_common::{Case, Error, Persona, Session, SessionId, StartedSession};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub database: String,
}

/// `?started_case_id=` query, required but validated by hand so a missing
/// value gets the same JSON error body as a malformed one
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub started_case_id: Option<String>,
}

impl SessionQuery {
    pub fn session_id(&self) -> caseai_common::Result<SessionId> {
        match self.started_case_id.as_deref() {
            Some(raw) => SessionId::parse(raw),
            None => Err(Error::Validation("started_case_id is required".to_string())),
        }
    }
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query("SELECT 1").execute(&ctx.db_pool).await {
        Ok(_) => "connected",
        Err(e) => {
            warn!("Health check: database unavailable: {}", e);
            "unavailable"
        }
    };
    let (code, status) = if database == "connected" {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            module: "caseai-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database.to_string(),
        }),
    )
}

/// GET /api/cases
pub async fn list_cases(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<Case>>> {
    Ok(Json(db::cases::list_cases(&ctx.db_pool).await?))
}

/// GET /api/cases/:case_id
pub async fn get_case(
    State(ctx): State<AppContext>,
    Path(case_id): Path<i64>,
) -> ApiResult<Json<Case>> {
    let case = db::cases::get_case(&ctx.db_pool, case_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("case {}", case_id)))?;
    Ok(Json(case))
}

/// POST /api/cases/:case_id/sessions
pub async fn start_session(
    State(ctx): State<AppContext>,
    Path(case_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<StartedSession>)> {
    if db::cases::get_case(&ctx.db_pool, case_id).await?.is_none() {
        return Err(Error::NotFound(format!("case {}", case_id)).into());
    }

    let (session, personas) = db::sessions::create_session(&ctx.db_pool, case_id, DEFAULT_CAST).await?;
    info!(
        "Started session {} for case {} with {} personas",
        session.started_case_id,
        case_id,
        personas.len()
    );

    Ok((StatusCode::CREATED, Json(StartedSession { session, personas })))
}

/// GET /api/sessions/:started_case_id
pub async fn get_session(
    State(ctx): State<AppContext>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Session>> {
    let id = SessionId::parse(&raw_id)?;
    Ok(Json(db::sessions::require_session(&ctx.db_pool, id).await?))
}

/// POST /api/sessions/:started_case_id/end
///
/// Marks the session ended and closes its notification channel; open feeds
/// drain what is stored and finish.
pub async fn end_session(
    State(ctx): State<AppContext>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Session>> {
    let id = SessionId::parse(&raw_id)?;
    db::sessions::require_session(&ctx.db_pool, id).await?;

    if db::sessions::end_session(&ctx.db_pool, id).await? {
        ctx.notifier.close(&id.channel());
        info!("Ended session {}", id);
    }

    Ok(Json(db::sessions::require_session(&ctx.db_pool, id).await?))
}

/// GET /api/personas?started_case_id=
pub async fn list_personas(
    State(ctx): State<AppContext>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<Vec<Persona>>> {
    let id = query.session_id()?;
    db::sessions::require_session(&ctx.db_pool, id).await?;
    Ok(Json(db::sessions::list_personas(&ctx.db_pool, id).await?))
}
