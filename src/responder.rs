use crate::constants::{
    CHAT_MAX_TOKENS, CHAT_MODEL, CHAT_TEMPERATURE, CRASH_INTERVIEW_OPENING,
    LONG_COVID_SYSTEM_PROMPT, REPLY_API_KEY_ERROR, REPLY_BILLING_ERROR, REPLY_EMPTY_COMPLETION,
    REPLY_RATE_LIMITED, REPLY_SERVICE_ERROR,
};
use crate::openai::OpenAiClient;
use crate::specs::openai::ChatCompletionRequest;
use crate::types::{ChatMessage, CrashlogError, ObservedError};
use axum::http::StatusCode;

/// Generates the assistant reply for a validated conversation.
///
/// Never fails: vendor and configuration errors are folded into fixed
/// user-facing strings so the chat surface always has something to show.
pub async fn generate_ai_response(client: &OpenAiClient, messages: &[ChatMessage]) -> String {
    let mut prompt = Vec::with_capacity(messages.len() + 1);
    prompt.push(ChatMessage::system(LONG_COVID_SYSTEM_PROMPT));
    prompt.extend_from_slice(messages);

    let request = ChatCompletionRequest {
        model: CHAT_MODEL.to_string(),
        messages: prompt,
        max_tokens: Some(CHAT_MAX_TOKENS),
        temperature: Some(CHAT_TEMPERATURE),
        response_format: None,
    };

    match client.chat_completion(&request).await {
        Ok(completion) => match completion.first_content() {
            Some(text) => {
                tracing::debug!(
                    reply = %crate::str_utils::log_preview(text, 80),
                    "Assistant reply generated"
                );
                text.to_string()
            }
            None => {
                tracing::warn!("Chat completion returned no content");
                REPLY_EMPTY_COMPLETION.to_string()
            }
        },
        Err(e) => {
            tracing::error!("OpenAI API error: {}", e.inner);
            reply_for_error(&e).to_string()
        }
    }
}

/// Maps a failed completion to the string the user sees.
pub fn reply_for_error(err: &ObservedError) -> &'static str {
    if let CrashlogError::Configuration(_) = err.inner {
        return REPLY_API_KEY_ERROR;
    }
    match err.inner.upstream_status() {
        Some(StatusCode::UNAUTHORIZED) => REPLY_API_KEY_ERROR,
        Some(StatusCode::TOO_MANY_REQUESTS) => REPLY_RATE_LIMITED,
        Some(StatusCode::PAYMENT_REQUIRED) => REPLY_BILLING_ERROR,
        _ => REPLY_SERVICE_ERROR,
    }
}

/// Opening assistant turn of a crash interview.
pub fn crash_report_interview() -> Vec<ChatMessage> {
    vec![ChatMessage::assistant(CRASH_INTERVIEW_OPENING)]
}
