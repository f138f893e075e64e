mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, test_state};
use crashlog::main_helper::app;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    match Request::builder().uri(uri).body(Body::empty()) {
        Ok(r) => r,
        Err(e) => panic!("Failed to build request: {:?}", e),
    }
}

#[tokio::test]
async fn test_liveness() {
    let (state, _dir) = test_state(&[]).await;
    let res = match app(state).oneshot(get("/health")).await {
        Ok(r) => r,
        Err(e) => panic!("oneshot failed: {:?}", e),
    };
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(body_json(res).await["status"], "ok");
}

#[tokio::test]
async fn test_readiness_requires_openai_key() {
    let (state, _dir) = test_state(&[]).await;
    let res = match app(state).oneshot(get("/readyz")).await {
        Ok(r) => r,
        Err(e) => panic!("oneshot failed: {:?}", e),
    };
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(res).await;
    assert_eq!(body["database"], "ok");
    assert_eq!(body["openai"], "missing_key");

    let (state, _dir) = test_state(&[("OPENAI_API_KEY", "sk-test")]).await;
    let res = match app(state).oneshot(get("/readyz")).await {
        Ok(r) => r,
        Err(e) => panic!("oneshot failed: {:?}", e),
    };
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "ready");
}

#[tokio::test]
async fn test_voice_providers_report_configuration() {
    let (state, _dir) = test_state(&[
        ("VOICEFLOW_VERSION_ID", "production"),
        ("VOICEFLOW_API_KEY", "VF.DM.test"),
        ("NEXT_PUBLIC_SPEECHLY_APP_ID", "speechly-app"),
    ])
    .await;
    let res = match app(state).oneshot(get("/api/voice/providers")).await {
        Ok(r) => r,
        Err(e) => panic!("oneshot failed: {:?}", e),
    };
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["voiceflow"], true);
    assert_eq!(body["elevenlabs"], false);
    assert_eq!(body["chat"], false);
    assert_eq!(body["client_keys"]["speechly_app_id"], "speechly-app");
    assert!(body["client_keys"]["alan_ai_key"].is_null());
}
