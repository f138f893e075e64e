use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing_error::SpanTrace;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CrashReportId(pub String);

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<String> for CrashReportId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn short(&self) -> &str {
        crate::str_utils::prefix_chars(&self.0, 8)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashReportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn short(&self) -> &str {
        crate::str_utils::prefix_chars(&self.0, 8)
    }
}

impl Default for CrashReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl UserId {
    pub fn short(&self) -> &str {
        crate::str_utils::prefix_chars(&self.0, 8)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CrashReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CrashlogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing configuration: {0}")]
    Configuration(String),

    #[error("Upstream error (status {0}): {1}")]
    Upstream(axum::http::StatusCode, String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Unrecognized vendor payload: {0}")]
    UnrecognizedPayload(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

impl CrashlogError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into(), SpanTrace::capture())
    }

    /// Upstream HTTP status, when the failure came from a vendor response.
    pub fn upstream_status(&self) -> Option<axum::http::StatusCode> {
        match self {
            CrashlogError::Upstream(s, _) => Some(*s),
            CrashlogError::Network(e) => e.status(),
            _ => None,
        }
    }
}

impl axum::response::IntoResponse for ObservedError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, code) = match &self.inner {
            CrashlogError::Validation(m) => (
                axum::http::StatusCode::BAD_REQUEST,
                m.clone(),
                "VALIDATION_ERROR",
            ),
            CrashlogError::UnrecognizedPayload(m) => (
                axum::http::StatusCode::BAD_REQUEST,
                m.clone(),
                "UNRECOGNIZED_PAYLOAD",
            ),
            CrashlogError::Unauthorized => (
                axum::http::StatusCode::UNAUTHORIZED,
                "Not authenticated".to_string(),
                "UNAUTHORIZED",
            ),
            CrashlogError::Configuration(m) => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} configuration missing", m),
                "CONFIGURATION_ERROR",
            ),
            CrashlogError::Upstream(_, m) => (
                axum::http::StatusCode::BAD_GATEWAY,
                m.clone(),
                "UPSTREAM_ERROR",
            ),
            CrashlogError::Network(e) => (
                axum::http::StatusCode::BAD_GATEWAY,
                e.to_string(),
                "NETWORK_ERROR",
            ),
            CrashlogError::Extraction(m) => (
                axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                m.clone(),
                "EXTRACTION_ERROR",
            ),
            CrashlogError::Database(e) => {
                tracing::error!("Database error surfaced to client: {}", e);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "DATABASE_ERROR",
                )
            }
            CrashlogError::Serialization(e) => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "SERIALIZATION_ERROR",
            ),
            CrashlogError::Io(e) => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "IO_ERROR",
            ),
            CrashlogError::Internal(m, _) => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                m.clone(),
                "INTERNAL_ERROR",
            ),
        };
        (
            status,
            axum::Json(serde_json::json!({
                "error": msg,
                "code": code,
            })),
        )
            .into_response()
    }
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: CrashlogError,
    pub span_trace: SpanTrace,
}

impl std::fmt::Display for ObservedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\nSpan Trace:\n{}", self.inner, self.span_trace)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<CrashlogError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;
