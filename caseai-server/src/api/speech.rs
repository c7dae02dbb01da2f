//! Speech endpoints: synthesis proxy and transcription-to-message

use crate::error::ApiResult;
use crate::ingest::SubmitMessage;
use crate::state::AppContext;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use caseai_common::{Error, Message, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub started_case_id: String,
    /// Base64-encoded audio
    pub audio: String,
    pub mime_type: String,
    #[serde(default)]
    pub persona_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub transcription: String,
    pub message: Message,
}

/// POST /api/speech/synthesize -> audio/mpeg
pub async fn synthesize(
    State(ctx): State<AppContext>,
    payload: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let synthesizer = ctx
        .synthesizer
        .clone()
        .ok_or_else(|| Error::ProviderUnavailable("speech synthesis is not configured".to_string()))?;

    let Json(request) = payload?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(Error::Validation("text must not be empty".to_string()).into());
    }
    let voice = request
        .voice
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| ctx.config.providers.default_voice.clone());

    let audio = synthesizer.synthesize(text, &voice).await?;
    debug!("Synthesized {} bytes with voice {}", audio.len(), voice);

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}

/// POST /api/speech/transcribe
///
/// Transcribes the recording and stores the text as a human message. When
/// transcription fails nothing is stored and the user may record again.
pub async fn transcribe(
    State(ctx): State<AppContext>,
    payload: Result<Json<TranscribeRequest>, JsonRejection>,
) -> ApiResult<Json<TranscribeResponse>> {
    let transcriber = ctx
        .transcriber
        .clone()
        .ok_or_else(|| Error::ProviderUnavailable("speech transcription is not configured".to_string()))?;

    // Reject bad input before paying for a provider call
    let Json(request) = payload?;
    let session = SessionId::parse(&request.started_case_id)?;

    let audio = base64::engine::general_purpose::STANDARD
        .decode(request.audio.trim())
        .map_err(|e| Error::Validation(format!("audio is not valid base64: {}", e)))?;
    if audio.is_empty() {
        return Err(Error::Validation("audio must not be empty".to_string()).into());
    }

    let transcription = transcriber.transcribe(audio, &request.mime_type).await?;
    if transcription.trim().is_empty() {
        return Err(Error::Transcription("no speech detected".to_string()).into());
    }
    info!("Transcribed {} characters for session {}", transcription.len(), session);

    let message = ctx
        .ingest
        .submit(SubmitMessage {
            started_case_id: session.to_string(),
            content: transcription.clone(),
            is_human: true,
            persona_id: request.persona_id,
            awaiting_user_input: false,
            metadata: serde_json::json!({
                "source": "speech-to-text",
                "provider": "deepgram",
            }),
        })
        .await?;

    Ok(Json(TranscribeResponse {
        transcription,
        message,
    }))
}
