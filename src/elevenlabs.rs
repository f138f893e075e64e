use crate::config::ElevenLabsConfig;
use crate::constants::{REPLY_VOICE_CHAT_ERROR, REPLY_WEBHOOK_ERROR};
use crate::openai::OpenAiClient;
use crate::responder::{crash_report_interview, generate_ai_response};
use crate::specs::elevenlabs::{SignedUrlResponse, WebhookRequest, WebhookResponse};
use crate::types::{ChatMessage, CrashlogError, ObservedError, Result, Role};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const INVALID_CONVERSATION_FORMAT: &str = "Invalid conversation format";

/// Parses the server-tool payload into chat history.
/// Roles other than user/assistant are dropped; any other shape is rejected.
pub fn parse_webhook(payload: Value) -> Result<(Vec<ChatMessage>, Option<Value>)> {
    match payload.get("conversation") {
        Some(Value::Array(_)) => {}
        _ => {
            return Err(
                CrashlogError::UnrecognizedPayload(INVALID_CONVERSATION_FORMAT.to_string()).into(),
            )
        }
    }

    let request: WebhookRequest = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Unrecognized conversation entry: {}", e);
            return Err(
                CrashlogError::UnrecognizedPayload(INVALID_CONVERSATION_FORMAT.to_string()).into(),
            );
        }
    };

    let messages = request
        .conversation
        .iter()
        .filter_map(|entry| match Role::parse(entry.role())? {
            Role::System => None,
            role => Some(ChatMessage {
                role,
                content: entry.text().to_string(),
            }),
        })
        .collect();
    Ok((messages, request.tool_call_id))
}

/// `POST /api/elevenlabs/chat`: the agent's server tool.
pub async fn webhook_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Error in ElevenLabs chat endpoint: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error",
                    "result": REPLY_WEBHOOK_ERROR,
                })),
            )
                .into_response();
        }
    };

    let (messages, tool_call_id) = match parse_webhook(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Rejected ElevenLabs payload: {}", e.inner);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": INVALID_CONVERSATION_FORMAT })),
            )
                .into_response();
        }
    };

    tracing::info!(messages = messages.len(), "ElevenLabs server tool called");
    let result = generate_ai_response(&state.openai, &messages).await;

    Json(WebhookResponse {
        result,
        tool_call_id,
    })
    .into_response()
}

/// One voice turn outside the webhook. Starts a crash interview when there is no history.
pub async fn handle_voice_chat_message(
    client: &OpenAiClient,
    user_message: &str,
    history: &[ChatMessage],
) -> String {
    if user_message.trim().is_empty() {
        tracing::warn!("Empty voice message");
        return REPLY_VOICE_CHAT_ERROR.to_string();
    }

    let mut messages = if history.is_empty() {
        crash_report_interview()
    } else {
        history.to_vec()
    };
    messages.push(ChatMessage::user(user_message));

    tracing::info!(history = history.len(), "Voice chat message");
    generate_ai_response(client, &messages).await
}

/// Fetches a short-lived conversation URL for an agent.
pub async fn get_signed_url(
    http: &reqwest::Client,
    config: &ElevenLabsConfig,
    agent_id: &str,
) -> Result<String> {
    let api_key = match &config.api_key {
        Some(k) => k,
        None => return Err(CrashlogError::Configuration("ElevenLabs".to_string()).into()),
    };

    let url = format!(
        "{}/v1/convai/conversation/get_signed_url",
        config.base_url.trim_end_matches('/')
    );
    let response = http
        .get(url)
        .query(&[("agent_id", agent_id)])
        .header("xi-api-key", api_key)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = match response.text().await {
            Ok(text) => text,
            Err(_) => "Unknown error".to_string(),
        };
        tracing::error!(
            "Failed to get signed URL: {} {}",
            status,
            crate::str_utils::log_preview(&body, 200)
        );
        let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        return Err(CrashlogError::Upstream(status, "Failed to get signed URL".to_string()).into());
    }

    let parsed: SignedUrlResponse = response.json().await?;
    Ok(parsed.signed_url)
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub agent_id: Option<String>,
}

/// `GET /api/elevenlabs/signed-url`
pub async fn signed_url_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SignedUrlQuery>,
) -> std::result::Result<Json<Value>, ObservedError> {
    let config = &state.settings.elevenlabs;
    let agent_id = match query
        .agent_id
        .filter(|id| !id.is_empty())
        .or_else(|| config.agent_id.clone())
    {
        Some(id) => id,
        None => return Err(CrashlogError::Validation("agent_id is required".to_string()).into()),
    };

    let signed_url = get_signed_url(&state.http, config, &agent_id).await?;
    Ok(Json(json!({ "signed_url": signed_url })))
}
