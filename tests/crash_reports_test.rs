mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, completion_body, test_state};
use crashlog::crash_reports::{record_turn, save_crash_report, upsert_crash_report, UpsertOutcome};
use crashlog::db::{create_user, get_conversation, list_crash_reports};
use crashlog::main_helper::app;
use crashlog::models::StructuredCrashReport;
use crashlog::types::ChatMessage;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn report(severity: u8, trigger: &str) -> StructuredCrashReport {
    match serde_json::from_value(json!({
        "severity": severity,
        "triggers": [{"type": "physical", "description": trigger, "intensity": 7}],
        "symptoms": [{"name": "fatigue", "severity": 8}],
        "timeline": {"onset": "next morning", "recoveryTime": "3 days"},
        "aiSummary": "Crash Report"
    })) {
        Ok(r) => r,
        Err(e) => panic!("Failed to build report: {:?}", e),
    }
}

fn conversation() -> Vec<ChatMessage> {
    vec![
        ChatMessage::assistant("On a scale of 1 to 10, how severe was this crash for you?"),
        ChatMessage::user("About a 7. I walked to the shops yesterday."),
    ]
}

fn get_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(c) = cookie {
        builder = builder.header("cookie", c);
    }
    match builder.body(Body::empty()) {
        Ok(r) => r,
        Err(e) => panic!("Failed to build request: {:?}", e),
    }
}

#[tokio::test]
async fn test_second_extraction_updates_existing_report() {
    let (state, _dir) = test_state(&[]).await;
    let user = match create_user(&state.db, "pem@example.com", Some("Pat")).await {
        Ok(u) => u,
        Err(e) => panic!("create_user failed: {:?}", e),
    };

    let first = match upsert_crash_report(
        &state.db,
        &user,
        &report(6, "walking"),
        &conversation(),
        None,
    )
    .await
    {
        Ok(o) => o,
        Err(e) => panic!("first upsert failed: {}", e),
    };
    let conversation_id = match &first {
        UpsertOutcome::Created { conversation_id, .. } => conversation_id.clone(),
        other => panic!("expected Created, got {:?}", other),
    };

    let mut longer = conversation();
    longer.push(ChatMessage::assistant("What happened before it started?"));
    longer.push(ChatMessage::user("Actually it was more like an 8."));

    let second =
        match upsert_crash_report(&state.db, &user, &report(8, "walking"), &longer, None).await {
            Ok(o) => o,
            Err(e) => panic!("second upsert failed: {}", e),
        };
    assert_eq!(second, UpsertOutcome::Updated(first.report_id().clone()));

    let reports = match list_crash_reports(&state.db, &user).await {
        Ok(r) => r,
        Err(e) => panic!("list failed: {:?}", e),
    };
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, 8);
    assert_eq!(reports[0].raw_conversation.0.len(), 4);

    let stored = match get_conversation(&state.db, &conversation_id.0).await {
        Ok(Some(c)) => c,
        other => panic!("conversation missing: {:?}", other),
    };
    assert_eq!(stored.messages.0.len(), 4);
    assert_eq!(stored.crash_report_id.as_deref(), Some(first.report_id().0.as_str()));

    let analytics: (i64, Option<f64>, String) = match sqlx::query_as(
        "SELECT total_crashes, avg_severity, common_triggers FROM user_analytics WHERE user_id = ?",
    )
    .bind(&user.0)
    .fetch_one(&state.db)
    .await
    {
        Ok(row) => row,
        Err(e) => panic!("analytics query failed: {:?}", e),
    };
    assert_eq!(analytics.0, 1);
    assert_eq!(analytics.1, Some(8.0));
    assert_eq!(analytics.2, r#"["walking"]"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_for_one_user_all_succeed() {
    let (state, _dir) = test_state(&[]).await;
    let user = match create_user(&state.db, "overlap@example.com", None).await {
        Ok(u) => u,
        Err(e) => panic!("create_user failed: {:?}", e),
    };

    let mut handles = Vec::new();
    for severity in 5..9u8 {
        let pool = state.db.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            upsert_crash_report(&pool, &user, &report(severity, "walking"), &conversation(), None)
                .await
                .map_err(|e| e.to_string())
        }));
    }

    let mut errors = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => errors.push(e),
            Err(e) => panic!("upsert task panicked: {:?}", e),
        }
    }
    assert!(errors.is_empty(), "upserts failed: {:?}", errors);

    let reports = match list_crash_reports(&state.db, &user).await {
        Ok(r) => r,
        Err(e) => panic!("list failed: {:?}", e),
    };
    assert_eq!(reports.len(), 1);
}

#[tokio::test]
async fn test_reuse_window_excludes_old_reports() {
    let (state, _dir) = test_state(&[]).await;
    let user = match create_user(&state.db, "window@example.com", None).await {
        Ok(u) => u,
        Err(e) => panic!("create_user failed: {:?}", e),
    };

    let saved =
        match save_crash_report(&state.db, &user, &report(5, "work"), &conversation()).await {
            Ok(s) => s,
            Err(e) => panic!("save failed: {}", e),
        };
    let backdate = "UPDATE crash_reports SET created_at = '2020-01-01T00:00:00.000Z' WHERE id = ?";
    if let Err(e) = sqlx::query(backdate)
        .bind(&saved.report_id.0)
        .execute(&state.db)
        .await
    {
        panic!("backdate failed: {:?}", e);
    }

    let outcome = match upsert_crash_report(
        &state.db,
        &user,
        &report(4, "heat"),
        &conversation(),
        Some(60),
    )
    .await
    {
        Ok(o) => o,
        Err(e) => panic!("upsert failed: {}", e),
    };
    assert!(matches!(outcome, UpsertOutcome::Created { .. }));

    let reports = match list_crash_reports(&state.db, &user).await {
        Ok(r) => r,
        Err(e) => panic!("list failed: {:?}", e),
    };
    assert_eq!(reports.len(), 2);
}

#[tokio::test]
async fn test_record_turn_is_idempotent_per_user() {
    let server = MockServer::start().await;
    let extracted = json!({
        "isCrashReport": true,
        "severity": "7",
        "triggers": [
            {"type": "physical", "description": "walking to the shops", "intensity": null}
        ],
        "symptoms": [],
        "timeline": {"onset": null, "duration": null, "recoveryTime": null},
        "activities": [],
        "recoveryStrategies": [],
        "environmentalFactors": [],
        "aiSummary": "Crash Report"
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&format!(
            "```json\n{}\n```",
            extracted
        ))))
        .expect(2)
        .mount(&server)
        .await;

    let uri = server.uri();
    let (state, _dir) =
        test_state(&[("OPENAI_API_KEY", "sk-test"), ("OPENAI_BASE_URL", uri.as_str())]).await;
    let user = match create_user(&state.db, "turns@example.com", None).await {
        Ok(u) => u,
        Err(e) => panic!("create_user failed: {:?}", e),
    };

    for _ in 0..2 {
        match record_turn(&state, &user, &conversation()).await {
            Ok(Some(_)) => {}
            other => panic!("expected a persisted report, got {:?}", other),
        }
    }

    let reports = match list_crash_reports(&state.db, &user).await {
        Ok(r) => r,
        Err(e) => panic!("list failed: {:?}", e),
    };
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, 7);
}

#[tokio::test]
async fn test_not_a_crash_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"isCrashReport": false, "severity": null}"#,
        )))
        .mount(&server)
        .await;

    let uri = server.uri();
    let (state, _dir) =
        test_state(&[("OPENAI_API_KEY", "sk-test"), ("OPENAI_BASE_URL", uri.as_str())]).await;
    let user = match create_user(&state.db, "fine@example.com", None).await {
        Ok(u) => u,
        Err(e) => panic!("create_user failed: {:?}", e),
    };

    let messages = vec![ChatMessage::user("What's a good pacing app?")];
    match record_turn(&state, &user, &messages).await {
        Ok(None) => {}
        other => panic!("expected no report, got {:?}", other),
    }
    let reports = match list_crash_reports(&state.db, &user).await {
        Ok(r) => r,
        Err(e) => panic!("list failed: {:?}", e),
    };
    assert!(reports.is_empty());
}

#[tokio::test]
async fn test_routes_require_session() {
    let (state, _dir) = test_state(&[]).await;
    let res = match app(state)
        .oneshot(get_with_cookie("/api/crash-reports", None))
        .await
    {
        Ok(r) => r,
        Err(e) => panic!("oneshot failed: {:?}", e),
    };
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_routes_list_and_analyze_for_session_user() {
    let (state, _dir) = test_state(&[]).await;
    let user = match create_user(&state.db, "list@example.com", None).await {
        Ok(u) => u,
        Err(e) => panic!("create_user failed: {:?}", e),
    };

    let router = app(state.clone());
    let res = match router
        .clone()
        .oneshot(get_with_cookie(
            "/api/crash-reports/analysis",
            Some("session_user=list@example.com"),
        ))
        .await
    {
        Ok(r) => r,
        Err(e) => panic!("oneshot failed: {:?}", e),
    };
    assert_eq!(res.status(), StatusCode::OK);
    let analysis = body_json(res).await;
    assert_eq!(analysis["insights"][0], "No crash reports available for analysis yet.");
    assert_eq!(analysis["trends"]["severityTrend"], "stable");

    if let Err(e) =
        save_crash_report(&state.db, &user, &report(3, "stress"), &conversation()).await
    {
        panic!("save failed: {}", e);
    }

    let res = match router
        .oneshot(get_with_cookie("/api/crash-reports", Some("session_user=list@example.com")))
        .await
    {
        Ok(r) => r,
        Err(e) => panic!("oneshot failed: {:?}", e),
    };
    assert_eq!(res.status(), StatusCode::OK);
    let listed = body_json(res).await;
    assert_eq!(listed.as_array().map(|a| a.len()), Some(1));
    assert_eq!(listed[0]["severity"], 3);
    assert_eq!(listed[0]["triggers"][0]["description"], "stress");
}
