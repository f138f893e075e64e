use crate::config::ClientVoiceKeys;
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub database: String,
    pub openai: String,
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok" })
}

pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let mut db_ok = true;

    if let Err(e) = sqlx::query("SELECT 1").fetch_one(&state.db).await {
        tracing::error!("Readiness check: DB error: {}", e);
        db_ok = false;
    }

    let openai_ok = state.openai.is_configured();
    if !openai_ok {
        tracing::warn!("Readiness check: OPENAI_API_KEY not set");
    }

    let ready = db_ok && openai_ok;
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "unready" }.to_string(),
            database: if db_ok { "ok" } else { "error" }.to_string(),
            openai: if openai_ok { "ok" } else { "missing_key" }.to_string(),
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct VoiceProviders {
    pub voiceflow: bool,
    pub elevenlabs: bool,
    pub chat: bool,
    pub transcription: bool,
    pub client_keys: ClientVoiceKeys,
}

/// Which voice paths the browser can use, plus the public keys it needs for them.
pub async fn voice_providers(State(state): State<Arc<AppState>>) -> Json<VoiceProviders> {
    let settings = &state.settings;
    let openai = state.openai.is_configured();
    Json(VoiceProviders {
        voiceflow: settings.voiceflow.is_some(),
        elevenlabs: settings.elevenlabs.api_key.is_some(),
        chat: openai,
        transcription: openai,
        client_keys: settings.client_voice.clone(),
    })
}
