//! Conversation data model shared by server and client

use crate::ids::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discussion case (read-only reference content)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: i64,
    pub title: String,
    pub description: String,
    pub content: String,
}

/// Lifecycle of a started case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of a case discussion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub started_case_id: SessionId,
    pub case_id: i64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

/// Participant in a session; exactly one per session has `is_human = true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub persona_id: Uuid,
    pub started_case_id: SessionId,
    pub name: String,
    pub role: String,
    pub background: String,
    pub personality: String,
    pub expertise: String,
    pub is_human: bool,
    pub voice: String,
}

/// A freshly started session with its cast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session: Session,
    pub personas: Vec<Persona>,
}

/// Total order of messages within a session: `(time_sent, message_id)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    /// Microseconds since the Unix epoch
    pub time_sent_us: i64,
    pub message_id: i64,
}

/// One conversational turn. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub started_case_id: SessionId,
    pub persona_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_role: Option<String>,
    pub content: String,
    pub is_human: bool,
    pub awaiting_user_input: bool,
    pub time_sent: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Message {
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            time_sent_us: self.time_sent.timestamp_micros(),
            message_id: self.message_id,
        }
    }

    /// Display name of the sender
    pub fn speaker(&self) -> &str {
        match (&self.persona_name, self.is_human) {
            (Some(name), _) => name,
            (None, true) => "You",
            (None, false) => "Participant",
        }
    }
}
