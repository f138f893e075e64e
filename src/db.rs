use crate::constants::DB_PRAGMAS;
use crate::models::{Conversation, ConversationStatus, CrashReport, StructuredCrashReport};
use crate::types::{ChatMessage, ConversationId, CrashReportId, CrashlogError, Result, UserId};
use chrono::{SecondsFormat, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteExecutor, SqlitePool};
use sqlx::types::Json;
use std::path::Path;

pub type DbPool = SqlitePool;

pub async fn init_db<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path_str = match path.as_ref().to_str() {
        Some(s) => s,
        None => {
            return Err(CrashlogError::internal(
                "Invalid database path: Path contains non-UTF8 characters",
            )
            .into())
        }
    };
    let url = format!("sqlite:{}?mode=rwc", path_str);

    let pool = match SqlitePool::connect(&url).await {
        Ok(p) => p,
        Err(e) => return Err(CrashlogError::Database(e).into()),
    };

    configure_db(&pool).await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        return Err(CrashlogError::internal(format!("Migration failed: {}", e)).into());
    }

    verify_schema_version(&pool).await;

    Ok(pool)
}

async fn configure_db(pool: &DbPool) -> Result<()> {
    for pragma in DB_PRAGMAS {
        if let Err(e) = sqlx::query(pragma).execute(pool).await {
            return Err(CrashlogError::Database(e).into());
        }
    }
    Ok(())
}

async fn verify_schema_version(pool: &DbPool) {
    let version_row: std::result::Result<(String,), sqlx::Error> =
        sqlx::query_as("SELECT value FROM schema_metadata WHERE key = 'schema_version'")
            .fetch_one(pool)
            .await;

    match version_row {
        Ok((version,)) => {
            tracing::info!("Database initialized. Schema version: {}", version);
        }
        Err(e) => {
            tracing::warn!("Could not verify schema version: {}", e);
        }
    }
}

/// Opens a transaction that holds the write lock from its first statement.
/// Competing writers wait on busy_timeout rather than failing the upgrade.
pub async fn begin_immediate(pool: &DbPool) -> Result<PoolConnection<Sqlite>> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(conn)
}

/// Commits on success, rolls back otherwise, so the connection goes back to
/// the pool outside any transaction.
pub async fn finish_immediate<T>(
    mut conn: PoolConnection<Sqlite>,
    outcome: Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                tracing::warn!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

// lexical order equals time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_minutes_ago(minutes: i64) -> String {
    (Utc::now() - chrono::Duration::minutes(minutes)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

// --- users ---

pub async fn create_user(pool: &DbPool, email: &str, name: Option<&str>) -> Result<UserId> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(now_timestamp())
        .execute(pool)
        .await?;
    Ok(UserId(id))
}

pub async fn find_user_id_by_email(pool: &DbPool, email: &str) -> Result<Option<UserId>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ? LIMIT 1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| UserId(id)))
}

// --- conversations ---

pub async fn insert_conversation<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &UserId,
    messages: &[ChatMessage],
    status: ConversationStatus,
) -> Result<ConversationId> {
    let id = ConversationId::new();
    let now = now_timestamp();
    sqlx::query(
        "INSERT INTO conversations (id, user_id, messages, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id.0)
    .bind(&user_id.0)
    .bind(Json(messages))
    .bind(status.as_str())
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;
    Ok(id)
}

pub async fn update_conversation_messages<'e, E: SqliteExecutor<'e>>(
    executor: E,
    conversation_id: &str,
    user_id: &UserId,
    messages: &[ChatMessage],
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE conversations SET messages = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(Json(messages))
    .bind(now_timestamp())
    .bind(conversation_id)
    .bind(&user_id.0)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn link_conversation_to_report(
    conn: &mut sqlx::SqliteConnection,
    conversation_id: &ConversationId,
    report_id: &CrashReportId,
) -> Result<()> {
    sqlx::query("UPDATE conversations SET crash_report_id = ?, updated_at = ? WHERE id = ?")
        .bind(&report_id.0)
        .bind(now_timestamp())
        .bind(&conversation_id.0)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT OR IGNORE INTO conversation_crash_reports (conversation_id, crash_report_id) \
         VALUES (?, ?)",
    )
    .bind(&conversation_id.0)
    .bind(&report_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_conversation(
    pool: &DbPool,
    conversation_id: &str,
) -> Result<Option<Conversation>> {
    let row = sqlx::query_as::<_, Conversation>(
        "SELECT id, user_id, crash_report_id, messages, status, created_at, updated_at \
         FROM conversations WHERE id = ?",
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// --- crash reports ---

const CRASH_REPORT_COLUMNS: &str = "id, user_id, severity, triggers, symptoms, timeline, \
    activities, recovery_strategies, environmental_factors, conversation_id, ai_summary, \
    raw_conversation, created_at, updated_at";

pub async fn insert_crash_report<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &UserId,
    report: &StructuredCrashReport,
    conversation_id: &ConversationId,
    raw_conversation: &[ChatMessage],
) -> Result<CrashReportId> {
    let id = CrashReportId::new();
    let now = now_timestamp();
    sqlx::query(
        "INSERT INTO crash_reports (id, user_id, severity, triggers, symptoms, timeline, \
         activities, recovery_strategies, environmental_factors, conversation_id, ai_summary, \
         raw_conversation, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id.0)
    .bind(&user_id.0)
    .bind(i64::from(report.severity))
    .bind(Json(&report.triggers))
    .bind(Json(&report.symptoms))
    .bind(Json(&report.timeline))
    .bind(Json(&report.activities))
    .bind(Json(&report.recovery_strategies))
    .bind(Json(&report.environmental_factors))
    .bind(&conversation_id.0)
    .bind(&report.ai_summary)
    .bind(Json(raw_conversation))
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;
    Ok(id)
}

pub async fn update_crash_report<'e, E: SqliteExecutor<'e>>(
    executor: E,
    report_id: &str,
    user_id: &UserId,
    report: &StructuredCrashReport,
    raw_conversation: &[ChatMessage],
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE crash_reports SET severity = ?, triggers = ?, symptoms = ?, timeline = ?, \
         activities = ?, recovery_strategies = ?, environmental_factors = ?, ai_summary = ?, \
         raw_conversation = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(i64::from(report.severity))
    .bind(Json(&report.triggers))
    .bind(Json(&report.symptoms))
    .bind(Json(&report.timeline))
    .bind(Json(&report.activities))
    .bind(Json(&report.recovery_strategies))
    .bind(Json(&report.environmental_factors))
    .bind(&report.ai_summary)
    .bind(Json(raw_conversation))
    .bind(now_timestamp())
    .bind(report_id)
    .bind(&user_id.0)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Most recently created report for the user, optionally no older than `since`.
pub async fn find_latest_crash_report<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &UserId,
    since: Option<&str>,
) -> Result<Option<CrashReport>> {
    let sql = match since {
        Some(_) => format!(
            "SELECT {} FROM crash_reports WHERE user_id = ? AND created_at >= ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            CRASH_REPORT_COLUMNS
        ),
        None => format!(
            "SELECT {} FROM crash_reports WHERE user_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            CRASH_REPORT_COLUMNS
        ),
    };
    let mut query = sqlx::query_as::<_, CrashReport>(&sql).bind(&user_id.0);
    if let Some(since) = since {
        query = query.bind(since);
    }
    Ok(query.fetch_optional(executor).await?)
}

pub async fn list_crash_reports(pool: &DbPool, user_id: &UserId) -> Result<Vec<CrashReport>> {
    let sql = format!(
        "SELECT {} FROM crash_reports WHERE user_id = ? ORDER BY created_at ASC, rowid ASC",
        CRASH_REPORT_COLUMNS
    );
    let rows = sqlx::query_as::<_, CrashReport>(&sql)
        .bind(&user_id.0)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

// --- analytics ---

pub async fn upsert_user_analytics(
    pool: &DbPool,
    user_id: &UserId,
    total_crashes: i64,
    avg_severity: Option<f64>,
    common_triggers: &[String],
) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_analytics (user_id, total_crashes, avg_severity, common_triggers, last_calculated) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET total_crashes = excluded.total_crashes, \
         avg_severity = excluded.avg_severity, common_triggers = excluded.common_triggers, \
         last_calculated = excluded.last_calculated",
    )
    .bind(&user_id.0)
    .bind(total_crashes)
    .bind(avg_severity)
    .bind(Json(common_triggers))
    .bind(now_timestamp())
    .execute(pool)
    .await?;
    Ok(())
}
