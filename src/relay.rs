use crate::specs::voiceflow::Trace;
use crate::types::Result;
use crate::voiceflow::VoiceflowClient;
use crate::AppState;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
};
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

pub const RELAY_CHANNEL_CAPACITY: usize = 32;
pub const RELAY_ERROR_MESSAGE: &str = "Failed to process message";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
}

/// One SSE frame on `/api/voiceflow/stream`, shared by the relay and the voice client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum RelayFrame {
    Speak(Value),
    End(Map<String, Value>),
    Error(ErrorPayload),
}

impl RelayFrame {
    pub fn end() -> Self {
        RelayFrame::End(Map::new())
    }

    pub fn error() -> Self {
        RelayFrame::Error(ErrorPayload {
            message: RELAY_ERROR_MESSAGE.to_string(),
        })
    }

    /// Spoken text carried by a `speak` frame.
    pub fn speak_text(&self) -> Option<&str> {
        match self {
            RelayFrame::Speak(payload) => payload.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    fn to_event(&self) -> Event {
        let data = match serde_json::to_string(self) {
            Ok(s) => s,
            Err(_) => r#"{"type":"error","payload":{"message":"Failed to process message"}}"#
                .to_string(),
        };
        Event::default().data(data)
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

fn apply_stream_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    apply_cors_headers(response);
}

fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

pub async fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_cors_headers(&mut response);
    response
}

/// `POST /api/voiceflow/stream`: relays Voiceflow speech as SSE frames.
pub async fn voiceflow_stream(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("SSE endpoint error: {}", e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let message = match payload.get("message").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => return plain(StatusCode::BAD_REQUEST, "Message is required"),
    };
    let session_id = payload
        .get("sessionId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let config = match &state.settings.voiceflow {
        Some(c) => c.clone(),
        None => {
            tracing::error!("Missing Voiceflow environment variables");
            return plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Voiceflow configuration missing",
            );
        }
    };

    let launch = session_id.is_some();
    let user_id = match session_id {
        Some(id) => id,
        None => uuid::Uuid::new_v4().to_string(),
    };

    tracing::info!(
        launch,
        chars = message.len(),
        "Relaying message to Voiceflow"
    );

    let client = VoiceflowClient::new(state.http.clone(), config);
    let traces = client.interact(user_id.clone(), message, launch);

    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
    let span = tracing::info_span!(
        "relay",
        vf_user = %crate::str_utils::prefix_chars(&user_id, 8)
    );
    tokio::spawn(relay_traces(traces, tx).instrument(span));

    let mut response = Sse::new(ReceiverStream::new(rx))
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response();
    apply_stream_headers(&mut response);
    response
}

async fn send_frame(
    tx: &mpsc::Sender<std::result::Result<Event, Infallible>>,
    frame: &RelayFrame,
) -> bool {
    if tx.send(Ok(frame.to_event())).await.is_err() {
        tracing::debug!("Client disconnected, stopping relay");
        return false;
    }
    true
}

/// Forwards `speak` traces until `end`, an error, or the vendor runs dry.
/// Always finishes with exactly one `end` or `error` frame while the client listens.
pub async fn relay_traces(
    mut traces: BoxStream<'static, Result<Trace>>,
    tx: mpsc::Sender<std::result::Result<Event, Infallible>>,
) {
    let mut spoken = 0usize;
    while let Some(item) = traces.next().await {
        match item {
            Ok(Trace::Speak { payload }) => {
                spoken += 1;
                if !send_frame(&tx, &RelayFrame::Speak(payload)).await {
                    return;
                }
            }
            Ok(Trace::End) => {
                tracing::info!(spoken, "Voiceflow stream ended");
                send_frame(&tx, &RelayFrame::end()).await;
                return;
            }
            Ok(other) => {
                tracing::trace!(kind = other.kind(), "Ignoring trace");
            }
            Err(e) => {
                tracing::error!("Voiceflow streaming error: {}", e.inner);
                send_frame(&tx, &RelayFrame::error()).await;
                return;
            }
        }
    }
    tracing::debug!(spoken, "Voiceflow sent no end trace; closing stream");
    send_frame(&tx, &RelayFrame::end()).await;
}
