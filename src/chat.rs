use crate::auth::OptionalUser;
use crate::crash_reports::spawn_extraction;
use crate::db::now_timestamp;
use crate::openai::OpenAiClient;
use crate::responder::generate_ai_response;
use crate::types::{ChatMessage, CrashlogError, Role};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const INVALID_MESSAGES_FORMAT: &str = "Invalid messages format";
pub const NO_VALID_MESSAGES: &str = "No valid messages provided";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatActionResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            timestamp: None,
            error: Some(error.into()),
        }
    }
}

/// Keeps only well-formed `{role, content}` entries.
pub fn validate_messages(
    raw: Option<&Value>,
) -> std::result::Result<Vec<ChatMessage>, CrashlogError> {
    let items = match raw.and_then(Value::as_array) {
        Some(items) => items,
        None => return Err(CrashlogError::Validation(INVALID_MESSAGES_FORMAT.to_string())),
    };

    let valid: Vec<ChatMessage> = items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let role = Role::parse(obj.get("role")?.as_str()?)?;
            let content = obj.get("content")?.as_str()?;
            Some(ChatMessage {
                role,
                content: content.to_string(),
            })
        })
        .collect();

    if valid.len() < items.len() {
        tracing::debug!(dropped = items.len() - valid.len(), "Dropped malformed chat entries");
    }
    if valid.is_empty() {
        return Err(CrashlogError::Validation(NO_VALID_MESSAGES.to_string()));
    }
    Ok(valid)
}

fn failure_from(err: CrashlogError) -> ChatActionResult {
    match err {
        CrashlogError::Validation(msg) => ChatActionResult::failure(msg),
        other => {
            tracing::error!("Chat action error: {}", other);
            ChatActionResult::failure("Internal server error")
        }
    }
}

async fn reply_to(client: &OpenAiClient, messages: &[ChatMessage]) -> ChatActionResult {
    tracing::info!(messages = messages.len(), "Generating chat reply");
    let reply = generate_ai_response(client, messages).await;
    ChatActionResult {
        success: true,
        message: Some(reply),
        timestamp: Some(now_timestamp()),
        error: None,
    }
}

/// Validates the conversation and produces the assistant reply.
pub async fn send_chat_message(
    client: &OpenAiClient,
    raw_messages: Option<&Value>,
) -> ChatActionResult {
    match validate_messages(raw_messages) {
        Ok(messages) => reply_to(client, &messages).await,
        Err(e) => failure_from(e),
    }
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    body: Bytes,
) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Chat request body is not JSON: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatActionResult::failure("Internal server error")),
            )
                .into_response();
        }
    };

    let messages = match validate_messages(payload.get("messages")) {
        Ok(m) => m,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(failure_from(e))).into_response(),
    };

    let result = reply_to(&state.openai, &messages).await;

    if let (Some(user_id), Some(reply)) = (user, result.message.as_ref()) {
        let mut conversation = messages;
        conversation.push(ChatMessage::assistant(reply.clone()));
        spawn_extraction(state.clone(), user_id, conversation);
    }

    (StatusCode::OK, Json(result)).into_response()
}
