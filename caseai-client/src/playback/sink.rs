//! Audio sinks

use super::AudioSink;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Pipes each clip into an external player (e.g. `mpv --no-video -`)
///
/// The player process is killed if the pending `play` future is dropped, so
/// aborting the sequencer silences output immediately.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl AudioSink for CommandSink {
    async fn play(&self, audio: Bytes) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::Playback(format!("failed to start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A player that exits early closes the pipe; its exit status tells the story
            if let Err(e) = stdin.write_all(&audio).await {
                debug!("Player closed stdin early: {}", e);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ClientError::Playback(format!("{} exited with {}", self.program, status)));
        }
        Ok(())
    }
}

/// Discards audio (text-only mode)
#[derive(Debug, Clone, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, _audio: Bytes) -> Result<()> {
        Ok(())
    }
}
