use serde::{Deserialize, Serialize};
use serde_json::Value;

/// --- ELEVENLABS CONVERSATIONAL AI SCHEMA (server tool + signed url) ---

/// One turn as the agent reports it. Both text field spellings occur in practice.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConversationEntry {
    Content { role: String, content: String },
    Message { role: String, message: String },
}

impl ConversationEntry {
    pub fn role(&self) -> &str {
        match self {
            ConversationEntry::Content { role, .. } | ConversationEntry::Message { role, .. } => {
                role
            }
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ConversationEntry::Content { content, .. } => content,
            ConversationEntry::Message { message, .. } => message,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRequest {
    pub conversation: Vec<ConversationEntry>,
    #[serde(default)]
    pub tool_call_id: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlResponse {
    pub signed_url: String,
}
