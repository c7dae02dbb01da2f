//! Playback Sequencer
//!
//! A FIFO of clips drained by a single worker task. The worker synthesizes,
//! plays to completion, then takes the next clip, so clips never overlap and
//! start in enqueue order. Status changes are published together with the
//! queue mutation that caused them.

use super::{AudioSink, PlaybackStatus, QueuedClip, SpeechSynthesizer};
use caseai_common::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Shared {
    queue: Mutex<VecDeque<QueuedClip>>,
    status: watch::Sender<PlaybackStatus>,
    wake: Notify,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    synthesis_timeout: Duration,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<QueuedClip>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct PlaybackSequencer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackSequencer {
    /// Create the sequencer and spawn its worker (requires a tokio runtime)
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        synthesis_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(PlaybackStatus::default());
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            status,
            wake: Notify::new(),
            synthesizer,
            sink,
            synthesis_timeout,
        });

        let worker = tokio::spawn(run_worker(Arc::clone(&shared)));

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a message for speech; human and empty messages are ignored
    pub fn enqueue(&self, message: &Message, voice: &str) -> bool {
        if message.is_human || message.content.trim().is_empty() {
            return false;
        }

        let clip = QueuedClip {
            message_id: message.message_id,
            speaker: message.speaker().to_string(),
            text: message.content.clone(),
            voice: voice.to_string(),
        };

        {
            let mut queue = self.shared.queue();
            queue.push_back(clip);
            let len = queue.len();
            self.shared.status.send_modify(|s| s.queue_len = len);
        }
        self.shared.wake.notify_one();

        debug!("Sequencer: queued message {}", message.message_id);
        true
    }

    pub fn status(&self) -> PlaybackStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.shared.status.subscribe()
    }

    /// Drop pending clips and stop the worker, cutting off any clip in flight
    pub fn shutdown(&self) {
        let dropped = {
            let mut queue = self.shared.queue();
            let n = queue.len();
            queue.clear();
            n
        };

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = worker {
            handle.abort();
            info!("Sequencer: shut down ({} pending clips dropped)", dropped);
        }

        self.shared.status.send_replace(PlaybackStatus::default());
    }
}

impl Drop for PlaybackSequencer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut queue = shared.queue();
            let clip = queue.pop_front();
            if let Some(clip) = &clip {
                let len = queue.len();
                let speaker = clip.speaker.clone();
                shared.status.send_modify(|s| {
                    s.queue_len = len;
                    s.is_playing = true;
                    s.current_speaker = Some(speaker);
                });
            }
            clip
        };

        let Some(clip) = next else {
            shared.wake.notified().await;
            continue;
        };

        play_clip(&shared, &clip).await;

        let queue = shared.queue();
        let len = queue.len();
        shared.status.send_modify(|s| {
            s.queue_len = len;
            s.is_playing = false;
            s.current_speaker = None;
        });
    }
}

/// Synthesize and play one clip; failures skip the clip
async fn play_clip(shared: &Shared, clip: &QueuedClip) {
    let audio = match tokio::time::timeout(
        shared.synthesis_timeout,
        shared.synthesizer.synthesize(&clip.text, &clip.voice),
    )
    .await
    {
        Ok(Ok(audio)) => audio,
        Ok(Err(e)) => {
            warn!("Sequencer: synthesis failed for message {}, skipping: {}", clip.message_id, e);
            return;
        }
        Err(_) => {
            warn!(
                "Sequencer: synthesis for message {} exceeded {:?}, skipping",
                clip.message_id, shared.synthesis_timeout
            );
            return;
        }
    };

    debug!("Sequencer: playing message {} ({})", clip.message_id, clip.speaker);
    if let Err(e) = shared.sink.play(audio).await {
        warn!("Sequencer: playback failed for message {}: {}", clip.message_id, e);
    }
}
