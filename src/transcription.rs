use crate::constants::MAX_AUDIO_BYTES;
use crate::openai::OpenAiClient;
use crate::types::{CrashlogError, ObservedError};
use crate::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

pub const NO_AUDIO: &str = "No audio file provided";
pub const INVALID_AUDIO_TYPE: &str = "Invalid file type. Please provide an audio file.";
pub const AUDIO_TOO_LARGE: &str = "Audio file too large. Maximum size is 25MB.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranscriptionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptionResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            text: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug)]
pub struct AudioUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Content-type check done before the body is read.
pub fn check_audio_type(content_type: Option<&str>) -> std::result::Result<String, &'static str> {
    match content_type {
        Some(ct) if ct.starts_with("audio/") => Ok(ct.to_string()),
        _ => Err(INVALID_AUDIO_TYPE),
    }
}

/// Reads the `audio` field, enforcing type and size in that order.
async fn read_audio(multipart: &mut Multipart) -> std::result::Result<AudioUpload, &'static str> {
    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => return Err(NO_AUDIO),
            Err(e) => {
                tracing::warn!("Malformed multipart body: {}", e);
                return Err(NO_AUDIO);
            }
        };
        if field.name() != Some("audio") {
            continue;
        }

        let content_type = check_audio_type(field.content_type())?;
        let file_name = field.file_name().unwrap_or("audio.webm").to_string();

        let mut bytes = Vec::new();
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if bytes.len() + chunk.len() > MAX_AUDIO_BYTES {
                        return Err(AUDIO_TOO_LARGE);
                    }
                    bytes.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Audio upload interrupted: {}", e);
                    return Err(NO_AUDIO);
                }
            }
        }

        return Ok(AudioUpload {
            file_name,
            content_type,
            bytes,
        });
    }
}

/// User-facing message for a failed Whisper call.
pub fn transcription_error_message(err: &ObservedError) -> &'static str {
    if let CrashlogError::Configuration(_) = err.inner {
        return "API key error. Please check OpenAI configuration.";
    }
    match err.inner.upstream_status() {
        Some(StatusCode::UNAUTHORIZED) => "API key error. Please check OpenAI configuration.",
        Some(StatusCode::TOO_MANY_REQUESTS) => "Rate limit exceeded. Please try again in a moment.",
        Some(StatusCode::PAYLOAD_TOO_LARGE) => "Audio file too large.",
        _ => "Failed to transcribe audio. Please try again.",
    }
}

pub async fn transcribe_audio(client: &OpenAiClient, upload: AudioUpload) -> TranscriptionResult {
    tracing::info!(
        name = %upload.file_name,
        content_type = %upload.content_type,
        size = upload.bytes.len(),
        "Transcribing audio file"
    );
    match client
        .transcribe(upload.bytes, &upload.file_name, &upload.content_type)
        .await
    {
        Ok(text) => TranscriptionResult {
            success: true,
            text: Some(text),
            error: None,
        },
        Err(e) => {
            tracing::error!("Transcription error: {}", e.inner);
            TranscriptionResult::failure(transcription_error_message(&e))
        }
    }
}

pub async fn transcribe_handler(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Transcription request is not multipart: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(TranscriptionResult::failure(NO_AUDIO)),
            )
                .into_response();
        }
    };

    let upload = match read_audio(&mut multipart).await {
        Ok(u) => u,
        Err(msg) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(TranscriptionResult::failure(msg)),
            )
                .into_response()
        }
    };

    let result = transcribe_audio(&state.openai, upload).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(result)).into_response()
}
