//! HTTP client for the caseai-server API

use crate::error::{ClientError, Result};
use base64::Engine;
use bytes::Bytes;
use caseai_common::{Case, Message, Persona, Session, SessionId, StartedSession};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const USER_AGENT: &str = concat!("caseai-client/", env!("CARGO_PKG_VERSION"));

/// Body of `POST /api/messages`
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub started_case_id: SessionId,
    pub content: String,
    pub is_human: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<Uuid>,
    pub awaiting_user_input: bool,
}

impl SubmitRequest {
    pub fn human(session: SessionId, persona_id: Option<Uuid>, content: impl Into<String>) -> Self {
        Self {
            started_case_id: session,
            content: content.into(),
            is_human: true,
            persona_id,
            awaiting_user_input: false,
        }
    }
}

/// Body of `POST /api/speech/transcribe`
#[derive(Debug, Clone, Serialize)]
struct TranscribeRequest<'a> {
    started_case_id: SessionId,
    /// Base64-encoded audio
    audio: String,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    persona_id: Option<Uuid>,
}

/// A spoken turn: the transcript and the human message stored from it
#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    pub transcription: String,
    pub message: Message,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Thin typed wrapper over the server's JSON endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map non-2xx responses to [`ClientError::Api`]
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => match body.details {
                Some(details) => format!("{}: {}", body.error, details),
                None => body.error,
            },
            Err(_) => text,
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http_client.get(self.url(path)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn list_cases(&self) -> Result<Vec<Case>> {
        self.get_json("/api/cases").await
    }

    pub async fn start_session(&self, case_id: i64) -> Result<StartedSession> {
        let response = self
            .http_client
            .post(self.url(&format!("/api/cases/{}/sessions", case_id)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn get_session(&self, session: SessionId) -> Result<Session> {
        self.get_json(&format!("/api/sessions/{}", session)).await
    }

    pub async fn end_session(&self, session: SessionId) -> Result<Session> {
        let response = self
            .http_client
            .post(self.url(&format!("/api/sessions/{}/end", session)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn list_personas(&self, session: SessionId) -> Result<Vec<Persona>> {
        self.get_json(&format!("/api/personas?started_case_id={}", session))
            .await
    }

    pub async fn submit_message(&self, request: &SubmitRequest) -> Result<Message> {
        let response = self
            .http_client
            .post(self.url("/api/messages"))
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Pull feed: messages after `after_id`
    pub async fn list_messages(&self, session: SessionId, after_id: Option<i64>) -> Result<Vec<Message>> {
        let mut path = format!("/api/messages?started_case_id={}", session);
        if let Some(id) = after_id {
            path.push_str(&format!("&after_id={}", id));
        }
        self.get_json(&path).await
    }

    /// Open the push feed; the caller consumes the body as SSE
    pub async fn open_stream(&self, session: SessionId, last_seen_id: Option<i64>) -> Result<reqwest::Response> {
        let mut request = self
            .http_client
            .get(self.url("/api/messages/stream"))
            .query(&[("started_case_id", session.to_string())])
            .header("Accept", "text/event-stream");
        if let Some(id) = last_seen_id {
            request = request.query(&[("last_seen_id", id)]);
        }
        debug!("Opening feed for {} after {:?}", session, last_seen_id);
        Self::check(request.send().await?).await
    }

    /// Synthesized speech for `text` (audio/mpeg)
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes> {
        let response = self
            .http_client
            .post(self.url("/api/speech/synthesize"))
            .json(&serde_json::json!({ "text": text, "voice": voice }))
            .send()
            .await?;
        Ok(Self::check(response).await?.bytes().await?)
    }

    /// Transcribe a recording and store it as a human turn
    pub async fn transcribe(
        &self,
        session: SessionId,
        persona_id: Option<Uuid>,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<Transcription> {
        let request = TranscribeRequest {
            started_case_id: session,
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            mime_type,
            persona_id,
        };
        debug!("Sending {} bytes of {} for transcription", audio.len(), mime_type);
        let response = self
            .http_client
            .post(self.url("/api/speech/transcribe"))
            .json(&request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
