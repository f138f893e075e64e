use crate::auth::CurrentUser;
use crate::db::{self, DbPool};
use crate::extraction;
use crate::models::{ConversationStatus, CrashAnalysis, CrashReport, StructuredCrashReport};
use crate::types::{ChatMessage, ConversationId, CrashReportId, Result, UserId};
use crate::AppState;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::Instrument;

const ANALYTICS_TOP_TRIGGERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated(CrashReportId),
    Created {
        report_id: CrashReportId,
        conversation_id: ConversationId,
    },
}

impl UpsertOutcome {
    pub fn report_id(&self) -> &CrashReportId {
        match self {
            UpsertOutcome::Updated(id) => id,
            UpsertOutcome::Created { report_id, .. } => report_id,
        }
    }
}

/// Writes an extraction onto the user's most recent report, or creates the
/// conversation + report pair when there is none to reuse.
pub async fn upsert_crash_report(
    pool: &DbPool,
    user_id: &UserId,
    report: &StructuredCrashReport,
    messages: &[ChatMessage],
    reuse_window_mins: Option<i64>,
) -> Result<UpsertOutcome> {
    let since = reuse_window_mins.map(db::timestamp_minutes_ago);
    let mut conn = db::begin_immediate(pool).await?;
    let written = write_upsert(&mut conn, user_id, report, messages, since.as_deref()).await;
    let outcome = db::finish_immediate(conn, written).await?;

    refresh_user_analytics(pool, user_id).await?;
    Ok(outcome)
}

async fn write_upsert(
    conn: &mut sqlx::SqliteConnection,
    user_id: &UserId,
    report: &StructuredCrashReport,
    messages: &[ChatMessage],
    since: Option<&str>,
) -> Result<UpsertOutcome> {
    let existing = db::find_latest_crash_report(&mut *conn, user_id, since).await?;

    let outcome = match existing {
        Some(current) => {
            db::update_crash_report(&mut *conn, &current.id, user_id, report, messages).await?;
            if let Some(conversation_id) = &current.conversation_id {
                db::update_conversation_messages(&mut *conn, conversation_id, user_id, messages)
                    .await?;
            }
            UpsertOutcome::Updated(CrashReportId(current.id))
        }
        None => {
            let conversation_id =
                db::insert_conversation(&mut *conn, user_id, messages, ConversationStatus::Active)
                    .await?;
            let report_id =
                db::insert_crash_report(&mut *conn, user_id, report, &conversation_id, messages)
                    .await?;
            db::link_conversation_to_report(conn, &conversation_id, &report_id).await?;
            UpsertOutcome::Created {
                report_id,
                conversation_id,
            }
        }
    };
    Ok(outcome)
}

#[derive(Debug, Clone)]
pub struct SavedCrashReport {
    pub report_id: CrashReportId,
    pub conversation_id: ConversationId,
}

/// Stores a finished interview as a new completed conversation and report.
pub async fn save_crash_report(
    pool: &DbPool,
    user_id: &UserId,
    report: &StructuredCrashReport,
    messages: &[ChatMessage],
) -> Result<SavedCrashReport> {
    let mut tx = pool.begin().await?;
    let conversation_id =
        db::insert_conversation(&mut *tx, user_id, messages, ConversationStatus::Completed).await?;
    let report_id =
        db::insert_crash_report(&mut *tx, user_id, report, &conversation_id, messages).await?;
    db::link_conversation_to_report(&mut tx, &conversation_id, &report_id).await?;
    tx.commit().await?;

    tracing::info!(
        user = %user_id.short(),
        report = %report_id.short(),
        severity = report.severity,
        "Crash report saved"
    );
    refresh_user_analytics(pool, user_id).await?;
    Ok(SavedCrashReport {
        report_id,
        conversation_id,
    })
}

/// All of the user's reports, oldest first.
pub async fn get_user_crash_reports(pool: &DbPool, user_id: &UserId) -> Result<Vec<CrashReport>> {
    db::list_crash_reports(pool, user_id).await
}

/// Most frequent trigger descriptions, ties kept in first-seen order.
pub fn common_triggers(reports: &[CrashReport]) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for report in reports {
        for trigger in report.triggers.0.iter() {
            let key = trigger.description.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            match counts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, n)) => *n += 1,
                None => counts.push((key, 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(ANALYTICS_TOP_TRIGGERS)
        .map(|(k, _)| k)
        .collect()
}

pub async fn refresh_user_analytics(pool: &DbPool, user_id: &UserId) -> Result<()> {
    let reports = db::list_crash_reports(pool, user_id).await?;
    let total = reports.len() as i64;
    let avg = if reports.is_empty() {
        None
    } else {
        Some(reports.iter().map(|r| r.severity as f64).sum::<f64>() / reports.len() as f64)
    };
    let triggers = common_triggers(&reports);
    db::upsert_user_analytics(pool, user_id, total, avg, &triggers).await?;
    tracing::debug!(user = %user_id.short(), total, "User analytics refreshed");
    Ok(())
}

/// Runs the extractor over the conversation and persists a detected crash.
pub async fn record_turn(
    state: &AppState,
    user_id: &UserId,
    messages: &[ChatMessage],
) -> Result<Option<UpsertOutcome>> {
    if !state.openai.is_configured() {
        tracing::debug!("Skipping crash extraction: OpenAI not configured");
        return Ok(None);
    }

    let report = match extraction::extract_crash_report(&state.openai, messages).await? {
        Some(r) => r,
        None => {
            tracing::debug!(messages = messages.len(), "No crash detected in conversation");
            return Ok(None);
        }
    };

    let outcome = upsert_crash_report(
        &state.db,
        user_id,
        &report,
        messages,
        state.args.report_reuse_window_mins,
    )
    .await?;

    match &outcome {
        UpsertOutcome::Updated(id) => {
            tracing::info!(report = %id.short(), severity = report.severity, "Crash report updated")
        }
        UpsertOutcome::Created { report_id, .. } => tracing::info!(
            report = %report_id.short(),
            severity = report.severity,
            "Crash report created"
        ),
    }
    Ok(Some(outcome))
}

/// Fire-and-forget extraction after a chat reply. Failures are logged and
/// reported, never surfaced to the caller.
pub fn spawn_extraction(state: Arc<AppState>, user_id: UserId, messages: Vec<ChatMessage>) {
    let span = tracing::info_span!("extraction", user = %user_id.short());
    tokio::spawn(
        async move {
            if let Err(e) = record_turn(&state, &user_id, &messages).await {
                tracing::error!("Crash report extraction failed: {}", e.inner);
                state.reporter.report("crash_report_extraction", &e);
            }
        }
        .instrument(span),
    );
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<CrashReport>>> {
    let reports = get_user_crash_reports(&state.db, &user_id).await?;
    Ok(Json(reports))
}

pub async fn analysis_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CrashAnalysis>> {
    let reports = get_user_crash_reports(&state.db, &user_id).await?;
    let analysis = extraction::analyze_crash_reports(&state.openai, &reports).await;
    Ok(Json(analysis))
}
