use crate::config::{AppEnv, Settings};
use crate::redaction::{redact_text, RedactionLevel};
use crate::types::ObservedError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorEvent<'a> {
    service: &'static str,
    environment: &'a str,
    context: &'a str,
    message: String,
    span_trace: String,
}

/// Sink for failures that must not reach the user: background extraction,
/// webhook errors, vendor outages.
#[derive(Clone)]
pub struct ErrorReporter {
    http: reqwest::Client,
    endpoint: Option<String>,
    app_env: AppEnv,
}

impl ErrorReporter {
    pub fn new(http: reqwest::Client, settings: &Settings) -> Self {
        Self {
            http,
            endpoint: settings.error_tracking_url.clone(),
            app_env: settings.app_env,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.endpoint.is_some() && self.app_env != AppEnv::E2e
    }

    /// Logs the error under the `error_tracking` target and, when a sink URL
    /// is configured, forwards it without waiting for the result.
    pub fn report(&self, context: &str, err: &ObservedError) {
        if self.app_env == AppEnv::E2e {
            tracing::debug!(context, "Error reporting skipped in E2E: {}", err.inner);
            return;
        }

        tracing::error!(
            target: "error_tracking",
            context,
            error = %err.inner,
            "Reported error"
        );

        let endpoint = match &self.endpoint {
            Some(url) => url.clone(),
            None => return,
        };

        let message = redact_text(&err.inner.to_string(), RedactionLevel::Normal);
        let body = match serde_json::to_value(ErrorEvent {
            service: "crashlog",
            environment: self.app_env.as_str(),
            context,
            message,
            span_trace: err.span_trace.to_string(),
        }) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Could not serialize error event: {}", e);
                return;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => return,
        };
        let http = self.http.clone();
        runtime.spawn(async move {
            match http.post(&endpoint).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => tracing::warn!("Error tracker answered {}", resp.status()),
                Err(e) => tracing::warn!("Error tracker unreachable: {}", e),
            }
        });
    }
}
