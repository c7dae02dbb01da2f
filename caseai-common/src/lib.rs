//! # CaseAI Common Library
//!
//! Shared code for the CaseAI server and client including:
//! - Conversation data model (cases, sessions, personas, messages)
//! - Identifier grammar for sessions and notification channels
//! - Error taxonomy
//! - Configuration loading
//! - Database schema and seeding
//! - SSE event encoding

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod models;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use ids::{ChannelName, SessionId};
pub use models::{Case, Message, OrderKey, Persona, Session, SessionStatus, StartedSession};
