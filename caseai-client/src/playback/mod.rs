//! Spoken playback of simulated participants' messages
//!
//! One clip at a time, in arrival order. Synthesis and output are
//! collaborators behind traits so the sequencer can be driven by fakes.

pub mod sequencer;
pub mod sink;
pub mod synth;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use sequencer::PlaybackSequencer;
pub use sink::{CommandSink, NullSink};
pub use synth::HttpSynthesizer;

/// Text-to-speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes>;
}

/// Audio output; `play` resolves when the clip has finished
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: Bytes) -> Result<()>;
}

/// Snapshot of the sequencer, published on a watch channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStatus {
    /// Clips waiting (not counting the one playing)
    pub queue_len: usize,
    pub is_playing: bool,
    pub current_speaker: Option<String>,
}

impl PlaybackStatus {
    pub fn is_idle(&self) -> bool {
        self.queue_len == 0 && !self.is_playing
    }
}

/// One message waiting to be spoken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedClip {
    pub message_id: i64,
    pub speaker: String,
    pub text: String,
    pub voice: String,
}
