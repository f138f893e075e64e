use crate::config::OpenAiConfig;
use crate::constants::{TRANSCRIPTION_LANGUAGE, TRANSCRIPTION_MODEL};
use crate::specs::openai::{ApiErrorEnvelope, ChatCompletionRequest, ChatCompletionResponse};
use crate::types::{CrashlogError, Result};
use reqwest::multipart;

/// OpenAI HTTP client. Built once at startup and shared through `AppState`.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, config: &OpenAiConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(k) => Ok(k),
            None => Err(CrashlogError::Configuration("OpenAI".to_string()).into()),
        }
    }

    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = ?request.max_tokens,
            "[⚙️  -> ☁️ ] Chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) => text,
                Err(_) => "Unknown error".to_string(),
            };
            return Err(upstream_error(status, &body).into());
        }

        let completion: ChatCompletionResponse = response.json().await?;
        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "[☁️  -> ⚙️ ] Chat completion received"
            );
        }
        Ok(completion)
    }

    pub async fn transcribe(&self, audio: Vec<u8>, file_name: &str, mime: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file_part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| CrashlogError::Validation(format!("Invalid audio mime type: {}", e)))?;

        let form = multipart::Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", TRANSCRIPTION_LANGUAGE)
            .text("response_format", "text")
            .part("file", file_part);

        tracing::debug!(model = TRANSCRIPTION_MODEL, "[⚙️  -> ☁️ ] Sending audio to Whisper");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) => text,
                Err(_) => "Unknown error".to_string(),
            };
            return Err(upstream_error(status, &body).into());
        }

        let transcript = response.text().await?;
        tracing::info!(chars = transcript.len(), "Whisper transcription completed");
        Ok(transcript.trim().to_string())
    }
}

fn upstream_error(status: reqwest::StatusCode, body: &str) -> CrashlogError {
    let message = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.to_string(),
    };
    tracing::warn!("[☁️  -> ⚙️ ] OpenAI returned {}: {}", status, message);
    // reqwest and axum share the `http` crate, so the status converts losslessly
    let status = axum::http::StatusCode::from_u16(status.as_u16())
        .unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
    CrashlogError::Upstream(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_prefers_api_message() {
        let body =
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        match upstream_error(reqwest::StatusCode::UNAUTHORIZED, body) {
            CrashlogError::Upstream(status, msg) => {
                assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
                assert_eq!(msg, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let client = OpenAiClient::new(
            reqwest::Client::new(),
            &OpenAiConfig {
                api_key: None,
                base_url: "http://127.0.0.1:1".to_string(),
            },
        );
        let req = ChatCompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![],
            max_tokens: None,
            temperature: None,
            response_format: None,
        };
        match client.chat_completion(&req).await {
            Err(e) => assert!(matches!(e.inner, CrashlogError::Configuration(_))),
            Ok(_) => panic!("expected configuration error"),
        }
    }
}
