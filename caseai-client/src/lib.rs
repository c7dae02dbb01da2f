//! # CaseAI Client Library (caseai-client)
//!
//! Consumer side of the conversation feed: transports with resume-by-id,
//! a de-duplicating transcript, sequential spoken playback, and the
//! turn-taking gate that decides when the user may speak.

pub mod api_client;
pub mod error;
pub mod playback;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod turn;

pub use api_client::{ApiClient, SubmitRequest, Transcription};
pub use error::{ClientError, Result};
pub use session::{ConversationSession, SessionConfig};
pub use transcript::Transcript;
pub use turn::{GateState, TurnGate, TurnTicket};
