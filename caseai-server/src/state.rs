//! Shared application context
//!
//! Everything a handler needs is owned here and passed in explicitly; there
//! is no module-level pool or client.

use crate::config::Config;
use crate::feed::ConversationFeed;
use crate::ingest::MessageIngest;
use crate::notifier::ChangeNotifier;
use crate::providers::{SpeechSynthesizer, SpeechTranscriber};
use crate::responder::ResponseProvider;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Shared application context passed to all handlers
///
/// Cloning is cheap; axum clones it per request.
#[derive(Clone)]
pub struct AppContext {
    pub db_pool: SqlitePool,
    pub notifier: Arc<ChangeNotifier>,
    pub feed: ConversationFeed,
    pub ingest: MessageIngest,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    pub transcriber: Option<Arc<dyn SpeechTranscriber>>,
    pub config: Arc<Config>,
}

impl AppContext {
    /// Wire the pipeline around an initialized pool
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        let notifier = ChangeNotifier::new(config.feed.channel_capacity);
        let feed = ConversationFeed::new(db_pool.clone(), Arc::clone(&notifier), config.feed.clone());
        let ingest = MessageIngest::new(db_pool.clone(), Arc::clone(&notifier));

        Self {
            db_pool,
            notifier,
            feed,
            ingest,
            synthesizer: None,
            transcriber: None,
            config: Arc::new(config),
        }
    }

    /// Answer human turns with a response provider
    pub fn with_responder(mut self, responder: Arc<dyn ResponseProvider>) -> Self {
        let delay = Duration::from_millis(self.config.responder.reply_delay_ms);
        self.ingest = self.ingest.with_responder(responder, delay);
        self
    }

    /// Enable the speech endpoints
    pub fn with_speech(
        mut self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn SpeechTranscriber>,
    ) -> Self {
        self.synthesizer = Some(synthesizer);
        self.transcriber = Some(transcriber);
        self
    }
}
