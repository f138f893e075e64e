//! Client side of the voice chat: relay first, text chat as fallback.
//!
//! The orchestrator talks to this service over HTTP exactly as the browser
//! does, so it can drive a headless voice session or an end-to-end test.

use crate::constants::VOICE_APOLOGY;
use crate::relay::RelayFrame;
use crate::types::{ChatMessage, CrashlogError, Result};
use async_trait::async_trait;
use axum::http::StatusCode;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec};

pub const DEFAULT_REARM_DELAY: Duration = Duration::from_millis(1000);
pub const SPEECH_ERROR_REARM_DELAY: Duration = Duration::from_millis(500);
pub const GENERIC_ERROR: &str = "An error occurred. Please try again.";
pub const LISTEN_ERROR: &str = "Failed to start listening. Please try again.";

/// Speech output and recognition, supplied by the host (browser bridge, TTS engine, test double).
#[async_trait]
pub trait VoiceIo: Send {
    /// Resolves once playback has finished or failed.
    async fn speak(&mut self, text: &str) -> Result<()>;
    async fn start_listening(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceFlags {
    pub listening: bool,
    pub loading: bool,
    pub speaking: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Relay,
    ChatFallback,
    Apology,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTurn {
    pub reply: String,
    pub source: ReplySource,
}

pub struct VoiceOrchestrator<V: VoiceIo> {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
    utterances: usize,
    messages: Vec<ChatMessage>,
    flags: VoiceFlags,
    last_error: Option<String>,
    rearm_delay: Duration,
    io: V,
}

impl<V: VoiceIo> VoiceOrchestrator<V> {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, io: V) -> Self {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_id: crate::str_utils::prefix_chars(&session_id, 8).to_string(),
            utterances: 0,
            messages: Vec::new(),
            flags: VoiceFlags::default(),
            last_error: None,
            rearm_delay: DEFAULT_REARM_DELAY,
            io,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_rearm_delay(mut self, delay: Duration) -> Self {
        self.rearm_delay = delay;
        self
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.flags.disabled = disabled;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn flags(&self) -> VoiceFlags {
        self.flags
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn io(&self) -> &V {
        &self.io
    }

    /// Handles one recognized utterance end to end: reply, speak, re-arm.
    /// Returns `None` when the utterance is ignored.
    pub async fn process_utterance(&mut self, text: &str) -> Option<VoiceTurn> {
        let text = text.trim();
        if text.is_empty() || self.flags.loading || self.flags.disabled {
            return None;
        }

        self.flags.listening = false;
        self.flags.loading = true;
        self.last_error = None;
        self.messages.push(ChatMessage::user(text));
        let first_turn = self.utterances == 0;
        self.utterances += 1;

        let turn = match self.relay_reply(text, first_turn).await {
            Ok(reply) => VoiceTurn {
                reply,
                source: ReplySource::Relay,
            },
            Err(relay_err) => {
                tracing::warn!("Voiceflow error, falling back to chat: {}", relay_err.inner);
                match self.chat_reply().await {
                    Ok(reply) => VoiceTurn {
                        reply,
                        source: ReplySource::ChatFallback,
                    },
                    Err(chat_err) => {
                        tracing::error!("Error processing user input: {}", chat_err.inner);
                        VoiceTurn {
                            reply: VOICE_APOLOGY.to_string(),
                            source: ReplySource::Apology,
                        }
                    }
                }
            }
        };

        match turn.source {
            ReplySource::Apology => self.last_error = Some(GENERIC_ERROR.to_string()),
            _ => self.messages.push(ChatMessage::assistant(turn.reply.clone())),
        }
        self.flags.loading = false;

        self.speak_and_rearm(&turn.reply).await;
        Some(turn)
    }

    async fn speak_and_rearm(&mut self, text: &str) {
        self.flags.speaking = true;
        let spoken = self.io.speak(text).await;
        self.flags.speaking = false;

        let delay = match spoken {
            Ok(()) => self.rearm_delay,
            Err(e) => {
                tracing::warn!("Speech synthesis failed: {}", e.inner);
                SPEECH_ERROR_REARM_DELAY
            }
        };
        tokio::time::sleep(delay).await;

        let f = self.flags;
        if f.listening || f.loading || f.disabled || f.speaking {
            return;
        }
        match self.io.start_listening().await {
            Ok(()) => self.flags.listening = true,
            Err(e) => {
                tracing::warn!("Could not re-arm recognition: {}", e.inner);
                self.last_error = Some(LISTEN_ERROR.to_string());
            }
        }
    }

    /// Streams the reply from the relay, concatenating `speak` fragments.
    async fn relay_reply(&self, text: &str, include_session: bool) -> Result<String> {
        let mut body = json!({ "message": text });
        if include_session {
            body["sessionId"] = Value::String(self.session_id.clone());
        }

        let response = self
            .http
            .post(format!("{}/api/voiceflow/stream", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            return Err(CrashlogError::Upstream(status, "Voiceflow request failed".into()).into());
        }

        let bytes_stream = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other));
        let mut lines = FramedRead::new(
            tokio_util::io::StreamReader::new(bytes_stream),
            LinesCodec::new_with_max_length(1024 * 1024),
        );

        let mut reply = String::new();
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    return Err(CrashlogError::internal(format!("Relay read failed: {}", e)).into())
                }
            };
            let data = match line.strip_prefix("data: ") {
                Some(d) => d,
                None => continue,
            };
            match serde_json::from_str::<RelayFrame>(data) {
                Ok(frame @ RelayFrame::Speak(_)) => {
                    if let Some(fragment) = frame.speak_text() {
                        reply.push_str(fragment);
                    }
                }
                Ok(RelayFrame::End(_)) => break,
                Ok(RelayFrame::Error(payload)) => {
                    return Err(
                        CrashlogError::Upstream(StatusCode::BAD_GATEWAY, payload.message).into(),
                    )
                }
                Err(e) => tracing::warn!("Failed to parse SSE data: {}", e),
            }
        }

        if reply.is_empty() {
            return Err(CrashlogError::Upstream(
                StatusCode::BAD_GATEWAY,
                "No response from Voiceflow".into(),
            )
            .into());
        }
        Ok(reply)
    }

    /// Sends the full history to `/api/chat`.
    async fn chat_reply(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&json!({ "messages": self.messages }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                return Err(CrashlogError::internal(format!(
                    "Chat fallback returned unreadable body ({}): {}",
                    status, e
                ))
                .into())
            }
        };

        let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
        match body.get("message").and_then(Value::as_str) {
            Some(message) if success && !message.is_empty() => Ok(message.to_string()),
            _ => Err(CrashlogError::internal(format!("Chat fallback failed ({})", status)).into()),
        }
    }
}
