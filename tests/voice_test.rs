mod common;

use async_trait::async_trait;
use common::{completion_body, test_state};
use crashlog::constants::VOICE_APOLOGY;
use crashlog::main_helper::app;
use crashlog::types::{ChatMessage, CrashlogError, Result, Role};
use crashlog::voice::{ReplySource, VoiceIo, VoiceOrchestrator, GENERIC_ERROR};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingIo {
    spoken: Vec<String>,
    listen_calls: usize,
    fail_speech: bool,
}

#[async_trait]
impl VoiceIo for RecordingIo {
    async fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.push(text.to_string());
        if self.fail_speech {
            return Err(CrashlogError::internal("speech engine unavailable").into());
        }
        Ok(())
    }

    async fn start_listening(&mut self) -> Result<()> {
        self.listen_calls += 1;
        Ok(())
    }
}

fn orchestrator(base_url: &str, io: RecordingIo) -> VoiceOrchestrator<RecordingIo> {
    VoiceOrchestrator::new(reqwest::Client::new(), base_url, io).with_rearm_delay(Duration::ZERO)
}

const SSE_REPLY: &str = "data: {\"type\":\"speak\",\"payload\":{\"message\":\"Take it slow. \"}}\n\n\
data: {\"type\":\"speak\",\"payload\":{\"message\":\"How are you now?\"}}\n\n\
data: {\"type\":\"end\",\"payload\":{}}\n\n";

#[tokio::test]
async fn test_relay_reply_is_spoken_and_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voiceflow/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(SSE_REPLY),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut voice = orchestrator(&server.uri(), RecordingIo::default());
    let turn = match voice.process_utterance("I overdid it yesterday").await {
        Some(t) => t,
        None => panic!("utterance was ignored"),
    };

    assert_eq!(turn.source, ReplySource::Relay);
    assert_eq!(turn.reply, "Take it slow. How are you now?");
    assert_eq!(voice.io().spoken, vec!["Take it slow. How are you now?".to_string()]);
    assert_eq!(voice.io().listen_calls, 1);
    assert!(voice.flags().listening);
    assert_eq!(voice.messages().len(), 2);
    assert_eq!(voice.messages()[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_falls_back_to_chat_when_relay_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voiceflow/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal server error"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"messages": [
            {"role": "assistant", "content": "How was your energy this morning?"},
            {"role": "user", "content": "I feel awful"}
        ]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Rest is the priority today.",
            "timestamp": "2026-01-01T00:00:00.000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![ChatMessage::assistant("How was your energy this morning?")];
    let mut voice = orchestrator(&server.uri(), RecordingIo::default()).with_messages(history);
    let turn = match voice.process_utterance("I feel awful").await {
        Some(t) => t,
        None => panic!("utterance was ignored"),
    };
    assert_eq!(turn.source, ReplySource::ChatFallback);
    assert_eq!(
        voice.messages().last(),
        Some(&ChatMessage::assistant("Rest is the priority today."))
    );
    assert_eq!(voice.messages().len(), 3);
    assert!(voice.last_error().is_none());
}

#[tokio::test]
async fn test_apology_when_everything_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voiceflow/stream"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": "No valid messages provided"
        })))
        .mount(&server)
        .await;

    let io = RecordingIo {
        fail_speech: true,
        ..RecordingIo::default()
    };
    let mut voice = orchestrator(&server.uri(), io);
    let turn = match voice.process_utterance("hello?").await {
        Some(t) => t,
        None => panic!("utterance was ignored"),
    };

    assert_eq!(turn.source, ReplySource::Apology);
    assert_eq!(voice.io().spoken, vec![VOICE_APOLOGY.to_string()]);
    assert_eq!(voice.last_error(), Some(GENERIC_ERROR));
    assert_eq!(voice.messages().len(), 1);
    assert!(!voice.flags().loading);
    assert!(!voice.flags().speaking);
}

#[tokio::test]
async fn test_blank_and_disabled_utterances_ignored() {
    let mut voice = orchestrator("http://127.0.0.1:9", RecordingIo::default());
    assert!(voice.process_utterance("   ").await.is_none());
    voice.set_disabled(true);
    assert!(voice.process_utterance("hello").await.is_none());
    assert!(voice.messages().is_empty());
    assert!(voice.io().spoken.is_empty());
}

#[tokio::test]
async fn test_end_to_end_fallback_through_service() {
    let vendors = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/state/user/.+/interact$"))
        .respond_with(ResponseTemplate::new(500).set_body_string("runtime down"))
        .mount(&vendors)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("That sounds hard. How severe was it, 1 to 10?")),
        )
        .mount(&vendors)
        .await;

    let uri = vendors.uri();
    let (state, _dir) = test_state(&[
        ("OPENAI_API_KEY", "sk-test"),
        ("OPENAI_BASE_URL", uri.as_str()),
        ("VOICEFLOW_VERSION_ID", "production"),
        ("VOICEFLOW_API_KEY", "VF.DM.test"),
        ("VOICEFLOW_ENDPOINT", uri.as_str()),
    ])
    .await;

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(l) => l,
        Err(e) => panic!("Failed to bind: {:?}", e),
    };
    let addr = match listener.local_addr() {
        Ok(a) => a,
        Err(e) => panic!("No local addr: {:?}", e),
    };
    let router = app(state);
    tokio::spawn(async move { axum::serve(listener, router).await });

    let mut voice = orchestrator(&format!("http://{}", addr), RecordingIo::default());
    let turn = match voice.process_utterance("I crashed after a long walk").await {
        Some(t) => t,
        None => panic!("utterance was ignored"),
    };

    assert_eq!(turn.source, ReplySource::ChatFallback);
    assert_eq!(
        voice.messages().last().map(|m| m.content.as_str()),
        Some("That sounds hard. How severe was it, 1 to 10?")
    );
}
