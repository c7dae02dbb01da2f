//! Identifier utilities
//!
//! Session and persona identifiers are opaque UUIDs. Anything arriving from a
//! request is parsed through here before it reaches a query or a channel.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID field from untrusted input, naming the field on failure
pub fn parse_uuid(field: &str, s: &str) -> Result<Uuid> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Uuid::parse_str(trimmed)
        .map_err(|_| Error::Validation(format!("{} is not a valid identifier: {:?}", field, s)))
}

/// Identifier of one run of a case discussion (`started_case_id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(generate())
    }

    /// Parse a session id from a request parameter
    pub fn parse(s: &str) -> Result<Self> {
        parse_uuid("started_case_id", s).map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Name of the change-notification channel for this session
    pub fn channel(&self) -> ChannelName {
        ChannelName(format!("{}{}", ChannelName::PREFIX, self.0.simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pub/sub channel identifier
///
/// Only constructible from a parsed [`SessionId`] or through [`ChannelName::parse`],
/// which enforces `[a-z_][a-z0-9_]{0,62}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    const PREFIX: &'static str = "case_messages_";
    const MAX_LEN: usize = 63;

    pub fn parse(s: &str) -> Result<Self> {
        if Self::is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::Validation(format!("invalid channel name: {:?}", s)))
        }
    }

    fn is_valid(s: &str) -> bool {
        let mut chars = s.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        s.len() <= Self::MAX_LEN
            && (first.is_ascii_lowercase() || first == '_')
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
