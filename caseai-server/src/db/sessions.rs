//! Sessions (started cases) and their personas

use crate::cast::PersonaTemplate;
use caseai_common::{ids, time, Error, Persona, Result, Session, SessionId, SessionStatus};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct SessionRow {
    started_case_id: String,
    case_id: i64,
    status: String,
    started_at_us: i64,
}

impl SessionRow {
    fn into_session(self) -> Result<Session> {
        let status = SessionStatus::from_db(&self.status)
            .ok_or_else(|| Error::Internal(format!("unknown session status: {}", self.status)))?;
        Ok(Session {
            started_case_id: SessionId::parse(&self.started_case_id)
                .map_err(|e| Error::Internal(e.to_string()))?,
            case_id: self.case_id,
            status,
            started_at: time::from_micros(self.started_at_us)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct PersonaRow {
    persona_id: String,
    started_case_id: String,
    name: String,
    role: String,
    background: String,
    personality: String,
    expertise: String,
    is_human: bool,
    voice: String,
}

impl PersonaRow {
    fn into_persona(self) -> Result<Persona> {
        Ok(Persona {
            persona_id: Uuid::parse_str(&self.persona_id)
                .map_err(|e| Error::Internal(format!("corrupt persona_id: {}", e)))?,
            started_case_id: SessionId::parse(&self.started_case_id)
                .map_err(|e| Error::Internal(e.to_string()))?,
            name: self.name,
            role: self.role,
            background: self.background,
            personality: self.personality,
            expertise: self.expertise,
            is_human: self.is_human,
            voice: self.voice,
        })
    }
}

/// Start a case: create the session and its personas in one transaction
pub async fn create_session(
    pool: &SqlitePool,
    case_id: i64,
    cast: &[PersonaTemplate],
) -> Result<(Session, Vec<Persona>)> {
    let session = Session {
        started_case_id: SessionId::new(),
        case_id,
        status: SessionStatus::InProgress,
        started_at: time::now(),
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO sessions (started_case_id, case_id, status, started_at_us) VALUES (?, ?, ?, ?)",
    )
    .bind(session.started_case_id.to_string())
    .bind(case_id)
    .bind(session.status.as_str())
    .bind(session.started_at.timestamp_micros())
    .execute(&mut *tx)
    .await?;

    let mut personas = Vec::with_capacity(cast.len());
    for template in cast {
        let persona = template.instantiate(ids::generate(), session.started_case_id);
        sqlx::query(
            r#"
            INSERT INTO personas
                (persona_id, started_case_id, name, role, background, personality, expertise, is_human, voice)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(persona.persona_id.to_string())
        .bind(persona.started_case_id.to_string())
        .bind(&persona.name)
        .bind(&persona.role)
        .bind(&persona.background)
        .bind(&persona.personality)
        .bind(&persona.expertise)
        .bind(persona.is_human)
        .bind(&persona.voice)
        .execute(&mut *tx)
        .await?;
        personas.push(persona);
    }

    tx.commit().await?;

    Ok((session, personas))
}

/// Load a session
pub async fn get_session(pool: &SqlitePool, id: SessionId) -> Result<Option<Session>> {
    let row: Option<SessionRow> = sqlx::query_as(
        "SELECT started_case_id, case_id, status, started_at_us FROM sessions WHERE started_case_id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(SessionRow::into_session).transpose()
}

/// Load a session or fail with NotFound
pub async fn require_session(pool: &SqlitePool, id: SessionId) -> Result<Session> {
    get_session(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", id)))
}

/// Mark a session ended. Returns false if it was not in progress.
pub async fn end_session(pool: &SqlitePool, id: SessionId) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE sessions SET status = ? WHERE started_case_id = ? AND status = ?",
    )
    .bind(SessionStatus::Ended.as_str())
    .bind(id.to_string())
    .bind(SessionStatus::InProgress.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Personas of a session, human first then by name
pub async fn list_personas(pool: &SqlitePool, id: SessionId) -> Result<Vec<Persona>> {
    let rows: Vec<PersonaRow> = sqlx::query_as(
        r#"
        SELECT persona_id, started_case_id, name, role, background, personality, expertise, is_human, voice
        FROM personas
        WHERE started_case_id = ?
        ORDER BY is_human DESC, name ASC
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PersonaRow::into_persona).collect()
}

/// Load a persona, only if it belongs to `session`
pub async fn get_persona(
    pool: &SqlitePool,
    session: SessionId,
    persona_id: Uuid,
) -> Result<Option<Persona>> {
    let row: Option<PersonaRow> = sqlx::query_as(
        r#"
        SELECT persona_id, started_case_id, name, role, background, personality, expertise, is_human, voice
        FROM personas
        WHERE persona_id = ? AND started_case_id = ?
        "#,
    )
    .bind(persona_id.to_string())
    .bind(session.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(PersonaRow::into_persona).transpose()
}
