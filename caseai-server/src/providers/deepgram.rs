//! Deepgram speech API client
//!
//! Synthesis: `POST {base}/v1/speak?model={voice}` with `{"text": ...}`.
//! Transcription: `POST {base}/v1/listen` with the raw audio body.

use super::{SpeechSynthesizer, SpeechTranscriber};
use async_trait::async_trait;
use caseai_common::config::ProviderSection;
use caseai_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("CaseAI/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: Option<ListenResults>,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
}

/// Which call failed, for error mapping
#[derive(Clone, Copy)]
enum Call {
    Speak,
    Listen,
}

impl Call {
    fn error(self, msg: String) -> Error {
        match self {
            Call::Speak => Error::Synthesis(msg),
            Call::Listen => Error::Transcription(msg),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Call::Speak => "synthesis",
            Call::Listen => "transcription",
        }
    }
}

/// Deepgram API client
pub struct DeepgramClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    synthesis_timeout: Duration,
    transcription_timeout: Duration,
}

impl DeepgramClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        synthesis_timeout: Duration,
        transcription_timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            synthesis_timeout,
            transcription_timeout,
        })
    }

    /// Build from configuration; None when no API key is configured
    pub fn from_config(config: &ProviderSection, api_key: Option<String>) -> Result<Option<Self>> {
        let Some(key) = api_key.or_else(|| config.deepgram_api_key.clone()) else {
            return Ok(None);
        };
        if key.trim().is_empty() {
            return Ok(None);
        }
        Self::new(
            &config.deepgram_base_url,
            key,
            config.synthesis_timeout(),
            config.transcription_timeout(),
        )
        .map(Some)
    }

    fn map_send_error(call: Call, timeout: Duration, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(format!("{} exceeded {:?}", call.name(), timeout))
        } else {
            call.error(format!("request failed: {}", e))
        }
    }

    async fn check_status(call: Call, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Deepgram {} returned {}: {}", call.name(), status, body);
        Err(call.error(format!("provider returned {}", status)))
    }
}

#[async_trait]
impl SpeechSynthesizer for DeepgramClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::Validation("text is required".to_string()));
        }

        let url = format!("{}/v1/speak", self.base_url);
        debug!("Deepgram synthesis: {} chars, voice {}", text.len(), voice);

        let response = self
            .http_client
            .post(&url)
            .query(&[("model", voice)])
            .header("Authorization", format!("Token {}", self.api_key))
            .timeout(self.synthesis_timeout)
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| Self::map_send_error(Call::Speak, self.synthesis_timeout, e))?;

        let response = Self::check_status(Call::Speak, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(Call::Speak, self.synthesis_timeout, e))?;

        if bytes.is_empty() {
            return Err(Error::Synthesis("provider returned empty audio".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechTranscriber for DeepgramClient {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::Validation("audio is required".to_string()));
        }

        let url = format!("{}/v1/listen", self.base_url);
        debug!("Deepgram transcription: {} bytes of {}", audio.len(), mime_type);

        let response = self
            .http_client
            .post(&url)
            .query(&[
                ("model", "general"),
                ("language", "en-US"),
                ("smart_format", "true"),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", mime_type)
            .timeout(self.transcription_timeout)
            .body(audio)
            .send()
            .await
            .map_err(|e| Self::map_send_error(Call::Listen, self.transcription_timeout, e))?;

        let response = Self::check_status(Call::Listen, response).await?;
        let parsed: ListenResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("transcription exceeded {:?}", self.transcription_timeout))
            } else {
                Error::Transcription(format!("invalid response: {}", e))
            }
        })?;

        extract_transcript(parsed)
    }
}

fn extract_transcript(response: ListenResponse) -> Result<String> {
    let transcript = response
        .results
        .ok_or_else(|| Error::Transcription("no results in response".to_string()))?
        .channels
        .into_iter()
        .next()
        .ok_or_else(|| Error::Transcription("no channels in response".to_string()))?
        .alternatives
        .into_iter()
        .next()
        .ok_or_else(|| Error::Transcription("no alternatives in response".to_string()))?
        .transcript;

    if transcript.trim().is_empty() {
        return Err(Error::Transcription("empty transcript".to_string()));
    }
    Ok(transcript)
}
