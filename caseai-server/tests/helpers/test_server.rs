//! Test server wrapper for integration tests
//!
//! Builds the real router over a temp-file database so handlers, feed and
//! ingest run exactly as in production, minus the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use caseai_common::{Error, Persona, SessionId};
use caseai_server::api::build_router;
use caseai_server::providers::{SpeechSynthesizer, SpeechTranscriber};
use caseai_server::{AppContext, Config};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Router plus the context behind it
pub struct TestServer {
    pub ctx: AppContext,
    router: Router,
    _dir: TempDir,
}

impl TestServer {
    /// Fresh database, no responder, no speech providers
    pub async fn start() -> Self {
        Self::start_with(|ctx| ctx).await
    }

    /// Like `start`, letting the caller attach collaborators to the context
    pub async fn start_with(customize: impl FnOnce(AppContext) -> AppContext) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut config = Config::for_root(dir.path());
        config.feed.poll_interval_ms = 200;
        config.feed.retry_base_ms = 10;
        config.responder.reply_delay_ms = 0;

        let pool = caseai_common::db::init_database(&config.db_path, &config.database)
            .await
            .expect("init database");

        let ctx = customize(AppContext::new(pool, config));
        let router = build_router(ctx.clone());

        Self {
            ctx,
            router,
            _dir: dir,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Send a request; returns status and parsed JSON body (if any)
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Option<Value>) {
        let (status, bytes) = self.request_raw(method, path, body).await;
        let json = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes).expect("JSON body"))
        };
        (status, json)
    }

    /// Send a request; returns status and raw body bytes
    pub async fn request_raw(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                builder.body(Body::from(json.to_string())).expect("request")
            }
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, bytes.to_vec())
    }

    /// Start case 1 through the API
    pub async fn start_session(&self) -> (SessionId, Vec<Persona>) {
        let (status, body) = self.request(Method::POST, "/api/cases/1/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let body = body.expect("session body");
        let session: SessionId = serde_json::from_value(body["session"]["started_case_id"].clone()).expect("session id");
        let personas: Vec<Persona> = serde_json::from_value(body["personas"].clone()).expect("personas");
        (session, personas)
    }
}

/// Canned speech provider: synthesizes the text bytes, transcribes to a fixed
/// string, optionally failing or stalling
#[derive(Debug, Clone, Default)]
pub struct FakeSpeech {
    pub transcript: String,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl FakeSpeech {
    pub fn transcribing(text: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: text.to_string(),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> caseai_common::Result<Vec<u8>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::Synthesis("fake failure".to_string()));
        }
        Ok(format!("{}:{}", voice, text).into_bytes())
    }
}

#[async_trait]
impl SpeechTranscriber for FakeSpeech {
    async fn transcribe(&self, _audio: Vec<u8>, _mime_type: &str) -> caseai_common::Result<String> {
        if self.fail {
            return Err(Error::Transcription("fake failure".to_string()));
        }
        Ok(self.transcript.clone())
    }
}
