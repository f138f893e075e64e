use crate::config::VoiceflowConfig;
use crate::redaction::{redact_value, RedactionLevel};
use crate::specs::voiceflow::{Action, InteractRequest, Trace};
use crate::types::{CrashlogError, Result};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

/// Dialog Manager runtime client for one configured Voiceflow project.
#[derive(Clone)]
pub struct VoiceflowClient {
    http: reqwest::Client,
    config: VoiceflowConfig,
}

impl VoiceflowClient {
    pub fn new(http: reqwest::Client, config: VoiceflowConfig) -> Self {
        Self { http, config }
    }

    fn interact_url(&self, user_id: &str) -> String {
        format!(
            "{}/state/user/{}/interact",
            self.config.endpoint.trim_end_matches('/'),
            user_id
        )
    }

    /// Sends one action and returns the runtime's traces in order.
    pub async fn send(&self, user_id: &str, action: Action) -> Result<Vec<Trace>> {
        tracing::debug!(action = action.kind(), "[⚙️  -> ☁️ ] Voiceflow interact");

        let response = self
            .http
            .post(self.interact_url(user_id))
            .header("Authorization", &self.config.api_key)
            .header("versionID", &self.config.version_id)
            .json(&InteractRequest { action })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) => text,
                Err(_) => "Unknown error".to_string(),
            };
            tracing::warn!("[☁️  -> ⚙️ ] Voiceflow returned {}", status);
            let status = axum::http::StatusCode::from_u16(status.as_u16())
                .unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
            return Err(CrashlogError::Upstream(status, body).into());
        }

        let raw: Vec<Value> = response.json().await?;
        Ok(parse_traces(raw))
    }

    /// The whole exchange as one stream of traces: an optional `launch`
    /// followed by the user's text. A failed call ends the stream with its error.
    pub fn interact(
        &self,
        user_id: String,
        message: String,
        launch: bool,
    ) -> BoxStream<'static, Result<Trace>> {
        let mut actions = Vec::with_capacity(2);
        if launch {
            actions.push(Action::Launch);
        }
        actions.push(Action::text(message));

        let seed = Some((self.clone(), user_id, actions.into_iter()));
        stream::unfold(seed, |state| async move {
            let (client, user_id, mut pending) = state?;
            let action = pending.next()?;
            match client.send(&user_id, action).await {
                Ok(traces) => Some((Ok(traces), Some((client, user_id, pending)))),
                Err(e) => Some((Err(e), None)),
            }
        })
        .flat_map(|batch| match batch {
            Ok(traces) => stream::iter(traces.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        })
        .boxed()
    }
}

/// Typed traces; entries without a recognizable `type` are skipped.
fn parse_traces(raw: Vec<Value>) -> Vec<Trace> {
    let mut traces = Vec::with_capacity(raw.len());
    for mut value in raw {
        match serde_json::from_value::<Trace>(value.clone()) {
            Ok(trace) => traces.push(trace),
            Err(e) => {
                redact_value(&mut value, RedactionLevel::Strict);
                tracing::debug!("Skipping unrecognized trace {}: {}", value, e);
            }
        }
    }
    traces
}
