//! Client-side transcript
//!
//! Ordered by order key and de-duplicated by message id, so overlapping
//! deliveries (reconnect replay, push and pull together) are harmless.

use crate::error::{ClientError, Result};
use caseai_common::{Message, SessionId};
use std::collections::HashSet;

#[derive(Debug)]
pub struct Transcript {
    session: SessionId,
    messages: Vec<Message>,
    seen: HashSet<i64>,
}

impl Transcript {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            messages: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Add a delivered message
    ///
    /// Returns `Ok(false)` for a duplicate, `Ok(true)` when the message is new.
    pub fn push(&mut self, message: Message) -> Result<bool> {
        if message.started_case_id != self.session {
            return Err(ClientError::ForeignMessage {
                message_id: message.message_id,
            });
        }
        if !self.seen.insert(message.message_id) {
            return Ok(false);
        }

        let key = message.order_key();
        // Deliveries arrive in order, so this is almost always an append
        let at = self.messages.partition_point(|m| m.order_key() < key);
        self.messages.insert(at, message);
        Ok(true)
    }

    /// Id of the latest message in order, the resume point for reconnects
    pub fn last_message_id(&self) -> Option<i64> {
        self.messages.last().map(|m| m.message_id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
