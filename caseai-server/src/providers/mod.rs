//! Speech providers
//!
//! Third-party collaborators treated as unreliable: every call is bounded by
//! a timeout and failures map onto the common error taxonomy.

pub mod deepgram;

use async_trait::async_trait;
use caseai_common::Result;

pub use deepgram::DeepgramClient;

/// Text-to-speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Audio bytes (MPEG) for `text` spoken with `voice`
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

/// Speech-to-text
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String>;
}
