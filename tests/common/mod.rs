#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use crashlog::config::Settings;
use crashlog::db::init_db;
use crashlog::{AppState, Args};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// App state over a fresh temp database. Keep the `TempDir` alive for the test.
pub async fn test_state(env: &[(&str, &str)]) -> (Arc<AppState>, TempDir) {
    let dir = match tempfile::tempdir() {
        Ok(d) => d,
        Err(e) => panic!("Failed to create temp dir: {:?}", e),
    };
    let db = match init_db(dir.path().join("crashlog_test.db")).await {
        Ok(p) => p,
        Err(e) => panic!("Failed to init DB: {:?}", e),
    };

    let mut map: HashMap<String, String> = HashMap::new();
    map.insert("APP_ENV".to_string(), "E2E".to_string());
    for (k, v) in env {
        map.insert(k.to_string(), v.to_string());
    }
    let settings = match Settings::from_lookup(|k| map.get(k).cloned()) {
        Ok(s) => s,
        Err(e) => panic!("Invalid test settings: {}", e),
    };

    let state = AppState::new(reqwest::Client::new(), db, settings, Args::default());
    (Arc::new(state), dir)
}

pub fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    match Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
    {
        Ok(r) => r,
        Err(e) => panic!("Failed to build request: {:?}", e),
    }
}

pub async fn body_text(res: Response<Body>) -> String {
    let bytes = match axum::body::to_bytes(res.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(e) => panic!("Failed to read body: {:?}", e),
    };
    String::from_utf8_lossy(&bytes).to_string()
}

pub async fn body_json(res: Response<Body>) -> Value {
    let text = body_text(res).await;
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => panic!("Body is not JSON ({:?}): {}", e, text),
    }
}

/// `data:` payloads of an SSE body, in order.
pub fn sse_frames(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|l| l.strip_prefix("data: ").or_else(|| l.strip_prefix("data:")))
        .filter_map(|d| serde_json::from_str(d.trim()).ok())
        .collect()
}

pub fn completion_body(text: &str) -> Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}
