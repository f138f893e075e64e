use serde::{Deserialize, Serialize};
use serde_json::Value;

/// --- VOICEFLOW DIALOG MANAGER SCHEMA (interact endpoint) ---

#[derive(Debug, Clone, Serialize)]
pub struct InteractRequest {
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Launch,
    Text { payload: String },
}

impl Action {
    pub fn text(message: impl Into<String>) -> Self {
        Action::Text {
            payload: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Launch => "launch",
            Action::Text { .. } => "text",
        }
    }
}

/// One runtime output item. Only the kinds the relay acts on are modeled.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Speak {
        #[serde(default)]
        payload: Value,
    },
    Text {
        #[serde(default)]
        payload: Value,
    },
    End,
    #[serde(other)]
    Other,
}

impl Trace {
    pub fn kind(&self) -> &'static str {
        match self {
            Trace::Speak { .. } => "speak",
            Trace::Text { .. } => "text",
            Trace::End => "end",
            Trace::Other => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_shape() {
        let text = match serde_json::to_value(InteractRequest {
            action: Action::text("hello"),
        }) {
            Ok(v) => v,
            Err(e) => panic!("serialize failed: {:?}", e),
        };
        assert_eq!(text, json!({"action": {"type": "text", "payload": "hello"}}));

        let launch = match serde_json::to_value(InteractRequest {
            action: Action::Launch,
        }) {
            Ok(v) => v,
            Err(e) => panic!("serialize failed: {:?}", e),
        };
        assert_eq!(launch, json!({"action": {"type": "launch"}}));
    }

    #[test]
    fn test_trace_kinds() {
        let traces: Vec<Trace> = match serde_json::from_value(json!([
            {"type": "speak", "payload": {"message": "Hi", "type": "message"}},
            {"type": "path", "payload": {"path": "reference"}},
            {"type": "end", "time": 1}
        ])) {
            Ok(t) => t,
            Err(e) => panic!("parse failed: {:?}", e),
        };
        assert_eq!(traces[0].kind(), "speak");
        assert_eq!(traces[1], Trace::Other);
        assert_eq!(traces[2], Trace::End);
    }
}
