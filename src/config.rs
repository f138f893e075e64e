use crate::constants::{ELEVENLABS_BASE_URL, OPENAI_BASE_URL, VOICEFLOW_DEFAULT_ENDPOINT};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppEnv {
    Local,
    DeployPreview,
    BranchPreview,
    PreviewServer,
    Production,
    E2e,
    Ci,
}

impl AppEnv {
    pub fn parse(s: &str) -> Option<AppEnv> {
        match s {
            "LOCAL" => Some(AppEnv::Local),
            "DEPLOY_PREVIEW" => Some(AppEnv::DeployPreview),
            "BRANCH_PREVIEW" => Some(AppEnv::BranchPreview),
            "PREVIEW_SERVER" => Some(AppEnv::PreviewServer),
            "PRODUCTION" => Some(AppEnv::Production),
            "E2E" => Some(AppEnv::E2e),
            "CI" => Some(AppEnv::Ci),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Local => "LOCAL",
            AppEnv::DeployPreview => "DEPLOY_PREVIEW",
            AppEnv::BranchPreview => "BRANCH_PREVIEW",
            AppEnv::PreviewServer => "PREVIEW_SERVER",
            AppEnv::Production => "PRODUCTION",
            AppEnv::E2e => "E2E",
            AppEnv::Ci => "CI",
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceflowConfig {
    pub version_id: String,
    pub api_key: String,
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    pub base_url: String,
}

/// Public client keys for browser-side speech providers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientVoiceKeys {
    pub speechly_app_id: Option<String>,
    pub alan_ai_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_env: AppEnv,
    pub openai: OpenAiConfig,
    pub voiceflow: Option<VoiceflowConfig>,
    pub elevenlabs: ElevenLabsConfig,
    pub client_voice: ClientVoiceKeys,
    pub error_tracking_url: Option<String>,
}

/// Every boot-time problem found, so operators can fix them in one pass.
#[derive(Debug)]
pub struct SettingsError(pub Vec<String>);

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for problem in &self.0 {
            writeln!(f, "  - {}", problem)?;
        }
        Ok(())
    }
}

impl std::error::Error for SettingsError {}

impl Settings {
    pub fn from_env() -> std::result::Result<Self, SettingsError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let mut problems = Vec::new();

        let app_env = match get("APP_ENV") {
            None => AppEnv::Local,
            Some(raw) => match AppEnv::parse(&raw) {
                Some(env) => env,
                None => {
                    problems.push(format!("APP_ENV has unsupported value '{}'", raw));
                    AppEnv::Local
                }
            },
        };

        let error_tracking_url = get("ERROR_TRACKING_URL");
        if app_env == AppEnv::Production && error_tracking_url.is_none() {
            problems.push("ERROR_TRACKING_URL is required for production".to_string());
        }

        if !problems.is_empty() {
            return Err(SettingsError(problems));
        }

        let voiceflow = match (get("VOICEFLOW_VERSION_ID"), get("VOICEFLOW_API_KEY")) {
            (Some(version_id), Some(api_key)) => Some(VoiceflowConfig {
                version_id,
                api_key,
                endpoint: get("VOICEFLOW_ENDPOINT")
                    .unwrap_or_else(|| VOICEFLOW_DEFAULT_ENDPOINT.to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            app_env,
            openai: OpenAiConfig {
                api_key: get("OPENAI_API_KEY"),
                base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            },
            voiceflow,
            elevenlabs: ElevenLabsConfig {
                api_key: get("ELEVENLABS_API_KEY"),
                agent_id: get("ELEVENLABS_AGENT_ID"),
                base_url: get("ELEVENLABS_BASE_URL")
                    .unwrap_or_else(|| ELEVENLABS_BASE_URL.to_string()),
            },
            client_voice: ClientVoiceKeys {
                speechly_app_id: get("NEXT_PUBLIC_SPEECHLY_APP_ID"),
                alan_ai_key: get("NEXT_PUBLIC_ALAN_AI_KEY"),
            },
            error_tracking_url,
        })
    }

    pub fn log_summary(&self) {
        tracing::info!(
            app_env = %self.app_env,
            openai = self.openai.api_key.is_some(),
            voiceflow = self.voiceflow.is_some(),
            elevenlabs = self.elevenlabs.api_key.is_some(),
            speechly = self.client_voice.speechly_app_id.is_some(),
            alan_ai = self.client_voice.alan_ai_key.is_some(),
            error_tracking = self.error_tracking_url.is_some(),
            "Vendor integrations configured"
        );
        if self.voiceflow.is_none() {
            tracing::warn!("Voiceflow credentials missing; voice streaming will answer 500");
        }
        if self.openai.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY missing; chat replies will report a key error");
        }
    }
}
