//! Message log queries
//!
//! The log is append-only. Order key assignment happens inside the INSERT so
//! concurrent writers still produce a strict total order per session:
//! `time_sent_us = max(now, latest time in session)` and `message_id` comes
//! from AUTOINCREMENT under the same write lock.

use caseai_common::{time, Error, Message, OrderKey, Result, SessionId, SessionStatus};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// Row shape shared by every message read
const SELECT_MESSAGE: &str = r#"
    SELECT m.message_id, m.started_case_id, m.persona_id,
           p.name AS persona_name, p.role AS persona_role,
           m.content, m.is_human, m.awaiting_user_input,
           m.time_sent_us, m.metadata
    FROM messages m
    LEFT JOIN personas p ON p.persona_id = m.persona_id
"#;

#[derive(Debug, FromRow)]
struct MessageRow {
    message_id: i64,
    started_case_id: String,
    persona_id: Option<String>,
    persona_name: Option<String>,
    persona_role: Option<String>,
    content: String,
    is_human: bool,
    awaiting_user_input: bool,
    time_sent_us: i64,
    metadata: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let started_case_id = Uuid::parse_str(&self.started_case_id)
            .map(SessionId::from)
            .map_err(|e| Error::Internal(format!("corrupt started_case_id: {}", e)))?;

        let persona_id = self
            .persona_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("corrupt persona_id: {}", e)))?;

        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| Error::Internal(format!("corrupt metadata: {}", e)))?;

        Ok(Message {
            message_id: self.message_id,
            started_case_id,
            persona_id,
            persona_name: self.persona_name,
            persona_role: self.persona_role,
            content: self.content,
            is_human: self.is_human,
            awaiting_user_input: self.awaiting_user_input,
            time_sent: time::from_micros(self.time_sent_us)?,
            metadata,
        })
    }
}

/// Message to append
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub started_case_id: SessionId,
    pub persona_id: Option<Uuid>,
    pub content: String,
    pub is_human: bool,
    pub awaiting_user_input: bool,
    pub metadata: serde_json::Value,
}

/// Append a message and return the stored row
///
/// The row is only written while the session is in progress; the status check
/// is part of the INSERT so a concurrent end cannot slip a row in after feeds
/// have finished.
pub async fn insert_message(pool: &SqlitePool, new: &NewMessage) -> Result<Message> {
    let metadata = if new.metadata.is_null() {
        "{}".to_string()
    } else {
        new.metadata.to_string()
    };

    let message_id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO messages
            (started_case_id, persona_id, content, is_human, awaiting_user_input, time_sent_us, metadata)
        SELECT
            ?1, ?2, ?3, ?4, ?5,
            MAX(?6, COALESCE((SELECT MAX(time_sent_us) FROM messages WHERE started_case_id = ?1), 0)),
            ?7
        WHERE EXISTS (
            SELECT 1 FROM sessions WHERE started_case_id = ?1 AND status = ?8
        )
        RETURNING message_id
        "#,
    )
    .bind(new.started_case_id.to_string())
    .bind(new.persona_id.map(|id| id.to_string()))
    .bind(&new.content)
    .bind(new.is_human)
    .bind(new.awaiting_user_input)
    .bind(time::now_micros())
    .bind(metadata)
    .bind(SessionStatus::InProgress.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(message_id) = message_id else {
        return Err(Error::Validation(format!(
            "session {} is not in progress",
            new.started_case_id
        )));
    };

    get_message(pool, message_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("message {} vanished after insert", message_id)))
}

/// Load one message by id
pub async fn get_message(pool: &SqlitePool, message_id: i64) -> Result<Option<Message>> {
    let sql = format!("{} WHERE m.message_id = ?", SELECT_MESSAGE);
    let row: Option<MessageRow> = sqlx::query_as(&sql)
        .bind(message_id)
        .fetch_optional(pool)
        .await?;

    row.map(MessageRow::into_message).transpose()
}

/// Messages of a session strictly after `after`, ascending by order key
pub async fn query_messages(
    pool: &SqlitePool,
    session: SessionId,
    after: Option<OrderKey>,
) -> Result<Vec<Message>> {
    let after = after.unwrap_or(OrderKey {
        time_sent_us: i64::MIN,
        message_id: i64::MIN,
    });

    let sql = format!(
        "{} WHERE m.started_case_id = ?1 \
           AND (m.time_sent_us > ?2 OR (m.time_sent_us = ?2 AND m.message_id > ?3)) \
         ORDER BY m.time_sent_us ASC, m.message_id ASC",
        SELECT_MESSAGE
    );

    let rows: Vec<MessageRow> = sqlx::query_as(&sql)
        .bind(session.to_string())
        .bind(after.time_sent_us)
        .bind(after.message_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(MessageRow::into_message).collect()
}

/// Order key of a message, only if it belongs to `session`
pub async fn order_key_of(
    pool: &SqlitePool,
    session: SessionId,
    message_id: i64,
) -> Result<Option<OrderKey>> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT time_sent_us, message_id FROM messages WHERE message_id = ? AND started_case_id = ?",
    )
    .bind(message_id)
    .bind(session.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(time_sent_us, message_id)| OrderKey {
        time_sent_us,
        message_id,
    }))
}

/// Number of messages stored for a session
pub async fn count_messages(pool: &SqlitePool, session: SessionId) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE started_case_id = ?")
        .bind(session.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}
