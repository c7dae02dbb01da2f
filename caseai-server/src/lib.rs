//! # CaseAI Server Library (caseai-server)
//!
//! Real-time conversation delivery for case-discussion sessions.
//!
//! **Purpose:** Store messages in session order, deliver them to subscribers
//! over SSE or polling without gaps or duplicates, proxy speech synthesis and
//! transcription, and answer human turns with simulated personas.

pub mod api;
pub mod cast;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod notifier;
pub mod providers;
pub mod responder;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppContext;
