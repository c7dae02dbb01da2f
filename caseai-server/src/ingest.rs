//! Message Ingestion (write path)
//!
//! Validate, persist, then publish a change hint. The hint is best-effort;
//! feeds re-query the store so a lost hint only delays delivery.

use crate::db::{self, NewMessage};
use crate::notifier::{ChangeHint, ChangeNotifier};
use crate::responder::ResponseProvider;
use caseai_common::{ids, Error, Message, Result, SessionId, SessionStatus};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Submission as received from a client (identifiers still unparsed)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitMessage {
    #[serde(default)]
    pub started_case_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_human: bool,
    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub awaiting_user_input: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Write path for all messages, human and simulated
#[derive(Clone)]
pub struct MessageIngest {
    pool: SqlitePool,
    notifier: Arc<ChangeNotifier>,
    responder: Option<Arc<dyn ResponseProvider>>,
    reply_delay: Duration,
}

impl MessageIngest {
    pub fn new(pool: SqlitePool, notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            pool,
            notifier,
            responder: None,
            reply_delay: Duration::ZERO,
        }
    }

    /// Answer human turns with `responder`, pausing `reply_delay` between replies
    pub fn with_responder(mut self, responder: Arc<dyn ResponseProvider>, reply_delay: Duration) -> Self {
        self.responder = Some(responder);
        self.reply_delay = reply_delay;
        self
    }

    /// Validate and store a message, then notify the session's feeds
    ///
    /// Nothing is inserted when validation fails.
    pub async fn submit(&self, request: SubmitMessage) -> Result<Message> {
        let session = SessionId::parse(&request.started_case_id)?;

        if request.content.trim().is_empty() {
            return Err(Error::Validation("content must not be empty".to_string()));
        }

        let persona_id = request
            .persona_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| ids::parse_uuid("persona_id", s))
            .transpose()?;

        // Fails fast with 404/400; the INSERT re-checks the status atomically
        let record = db::sessions::require_session(&self.pool, session).await?;
        if record.status != SessionStatus::InProgress {
            return Err(Error::Validation(format!("session {} has ended", session)));
        }

        if let Some(id) = persona_id {
            let persona = db::sessions::get_persona(&self.pool, session, id)
                .await?
                .ok_or_else(|| {
                    Error::Validation(format!("persona {} is not part of session {}", id, session))
                })?;
            if persona.is_human != request.is_human {
                return Err(Error::Validation(format!(
                    "persona {} does not match is_human = {}",
                    id, request.is_human
                )));
            }
        }

        let message = self
            .append(NewMessage {
                started_case_id: session,
                persona_id,
                content: request.content,
                is_human: request.is_human,
                awaiting_user_input: request.awaiting_user_input,
                metadata: request.metadata,
            })
            .await?;

        if message.is_human {
            self.schedule_replies(message.clone());
        }

        Ok(message)
    }

    /// Persist and publish (no request validation)
    async fn append(&self, new: NewMessage) -> Result<Message> {
        let message = db::messages::insert_message(&self.pool, &new).await?;

        let reached = self.notifier.notify(
            &message.started_case_id.channel(),
            ChangeHint {
                message_id: message.message_id,
            },
        );
        debug!(
            "Stored message {} in session {} ({} listeners notified)",
            message.message_id, message.started_case_id, reached
        );

        Ok(message)
    }

    fn schedule_replies(&self, prompt: Message) {
        let Some(responder) = self.responder.clone() else {
            return;
        };
        let ingest = self.clone();

        tokio::spawn(async move {
            if let Err(e) = ingest.run_responder(responder.as_ref(), &prompt).await {
                warn!(
                    "Response provider failed for message {}: {}",
                    prompt.message_id, e
                );
            }
        });
    }

    async fn run_responder(&self, responder: &dyn ResponseProvider, prompt: &Message) -> Result<()> {
        let session = prompt.started_case_id;
        let personas = db::sessions::list_personas(&self.pool, session).await?;
        let replies = responder.respond(&personas, prompt).await;
        info!("Responder: {} replies to message {}", replies.len(), prompt.message_id);

        for reply in replies {
            if !self.reply_delay.is_zero() {
                tokio::time::sleep(self.reply_delay).await;
            }

            // Stop replying into a session that ended meanwhile
            let record = db::sessions::require_session(&self.pool, session).await?;
            if record.status != SessionStatus::InProgress {
                debug!("Responder: session {} ended, dropping remaining replies", session);
                break;
            }

            let stored = self
                .append(NewMessage {
                    started_case_id: session,
                    persona_id: Some(reply.persona_id),
                    content: reply.content,
                    is_human: false,
                    awaiting_user_input: reply.awaiting_user_input,
                    metadata: serde_json::json!({ "source": "responder" }),
                })
                .await;
            match stored {
                Ok(_) => {}
                Err(Error::Validation(reason)) => {
                    debug!("Responder: {}, dropping remaining replies", reason);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
