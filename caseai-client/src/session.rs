//! Consumer session: one joined conversation
//!
//! Wires a feed transport to the transcript, the playback sequencer and the
//! turn gate. Every new message is queued for playback before the gate sees
//! it, so a message that hands the floor to the user cannot open the gate
//! while its own clip (or any earlier one) is still pending.

use crate::api_client::{ApiClient, SubmitRequest, Transcription};
use crate::error::{ClientError, Result};
use crate::playback::{AudioSink, PlaybackSequencer, PlaybackStatus, SpeechSynthesizer};
use crate::transcript::Transcript;
use crate::transport::FeedTransport;
use crate::turn::TurnGate;
use caseai_common::{Message, SessionId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Voice for messages whose persona has none on record
    pub default_voice: String,
    pub synthesis_timeout: Duration,
    /// Buffered messages between transport and pump
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_voice: "aura-asteria-en".to_string(),
            synthesis_timeout: Duration::from_secs(15),
            channel_capacity: 64,
        }
    }
}

/// Per-message delivery shared by the pump task
struct Pipeline {
    transcript: Arc<Mutex<Transcript>>,
    sequencer: Arc<PlaybackSequencer>,
    gate: Arc<TurnGate>,
    playback: watch::Receiver<PlaybackStatus>,
    voices: HashMap<Uuid, String>,
    default_voice: String,
    new_messages: broadcast::Sender<Message>,
}

impl Pipeline {
    fn deliver(&self, message: Message) {
        let is_new = match lock(&self.transcript).push(message.clone()) {
            Ok(is_new) => is_new,
            Err(e) => {
                warn!("Dropping delivery: {}", e);
                return;
            }
        };
        if !is_new {
            debug!("Duplicate delivery of message {}", message.message_id);
            return;
        }

        let voice = message
            .persona_id
            .and_then(|id| self.voices.get(&id))
            .unwrap_or(&self.default_voice);
        self.sequencer.enqueue(&message, voice);
        // Apply the status under the watch borrow so a concurrent update
        // from the forwarder can't be overwritten with an older value
        self.gate.set_playback(&self.playback.borrow());
        self.gate.observe(&message);

        let _ = self.new_messages.send(message);
    }
}

fn lock(transcript: &Mutex<Transcript>) -> MutexGuard<'_, Transcript> {
    transcript.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ConversationSession {
    session: SessionId,
    api: ApiClient,
    human_persona: Option<Uuid>,
    transcript: Arc<Mutex<Transcript>>,
    sequencer: Arc<PlaybackSequencer>,
    gate: Arc<TurnGate>,
    new_messages: broadcast::Sender<Message>,
    feed_closed: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConversationSession {
    /// Join `session`: load its cast, then start delivery from the beginning
    pub async fn join(
        api: ApiClient,
        session: SessionId,
        transport: Arc<dyn FeedTransport>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        config: SessionConfig,
    ) -> Result<Self> {
        let personas = api.list_personas(session).await?;
        let human_persona = personas.iter().find(|p| p.is_human).map(|p| p.persona_id);
        let voices: HashMap<Uuid, String> = personas
            .iter()
            .filter(|p| !p.voice.is_empty())
            .map(|p| (p.persona_id, p.voice.clone()))
            .collect();

        let transcript = Arc::new(Mutex::new(Transcript::new(session)));
        let sequencer = Arc::new(PlaybackSequencer::new(synthesizer, sink, config.synthesis_timeout));
        let gate = Arc::new(TurnGate::new());
        let (new_messages, _) = broadcast::channel(256);
        let (closed_tx, feed_closed) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(config.channel_capacity.max(1));

        let mut tasks = Vec::with_capacity(3);

        // Transport
        tasks.push(tokio::spawn(async move {
            match transport.run(session, None, tx).await {
                Ok(()) => info!("Feed for session {} closed", session),
                Err(e) => error!("Feed for session {} failed: {}", session, e),
            }
        }));

        // Pump: transcript -> sequencer -> gate
        let pipeline = Pipeline {
            transcript: Arc::clone(&transcript),
            sequencer: Arc::clone(&sequencer),
            gate: Arc::clone(&gate),
            playback: sequencer.subscribe(),
            voices,
            default_voice: config.default_voice,
            new_messages: new_messages.clone(),
        };
        tasks.push(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                pipeline.deliver(message);
            }
            let _ = closed_tx.send(true);
        }));

        // Playback status -> gate
        let mut playback = sequencer.subscribe();
        let forward_gate = Arc::clone(&gate);
        tasks.push(tokio::spawn(async move {
            loop {
                forward_gate.set_playback(&playback.borrow_and_update());
                if playback.changed().await.is_err() {
                    break;
                }
            }
        }));

        info!("Joined session {} ({} personas)", session, personas.len());

        Ok(Self {
            session,
            api,
            human_persona,
            transcript,
            sequencer,
            gate,
            new_messages,
            feed_closed,
            tasks,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Snapshot of the transcript so far
    pub fn transcript(&self) -> Vec<Message> {
        lock(&self.transcript).messages().to_vec()
    }

    pub fn last_message_id(&self) -> Option<i64> {
        lock(&self.transcript).last_message_id()
    }

    pub fn gate(&self) -> Arc<TurnGate> {
        Arc::clone(&self.gate)
    }

    pub fn playback_status(&self) -> PlaybackStatus {
        self.sequencer.status()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackStatus> {
        self.sequencer.subscribe()
    }

    /// New (non-duplicate) messages as they are delivered
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Message> {
        self.new_messages.subscribe()
    }

    /// Send a typed turn; the transcript picks it up from the feed
    ///
    /// Refused with [`ClientError::TurnNotOpen`] unless the gate allows it.
    /// The gate stays closed while the request is in flight and reopens if
    /// the server does not store the message.
    pub async fn submit(&self, content: &str) -> Result<Message> {
        let request = SubmitRequest::human(self.session, self.human_persona, content);
        self.take_turn(self.api.submit_message(&request)).await
    }

    /// Send a spoken turn; the server transcribes it and stores the text
    pub async fn speak(&self, audio: &[u8], mime_type: &str) -> Result<Transcription> {
        self.take_turn(self.api.transcribe(self.session, self.human_persona, audio, mime_type))
            .await
    }

    async fn take_turn<T>(&self, send: impl Future<Output = Result<T>>) -> Result<T> {
        let ticket = self.gate.begin_turn().ok_or(ClientError::TurnNotOpen)?;
        match send.await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                warn!("Turn in session {} not stored: {}", self.session, e);
                self.gate.abandon_turn(ticket);
                Err(e)
            }
        }
    }

    /// Resolves once the feed has stopped (session ended or transport gave up)
    pub async fn closed(&self) {
        let mut rx = self.feed_closed.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Stop delivery, silence playback, release the HTTP stream
    pub fn leave(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.sequencer.shutdown();
        info!("Left session {}", self.session);
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.stop();
    }
}
