use crate::config::Settings;
use crate::db::DbPool;
use crate::error_tracking::ErrorReporter;
use crate::logging::request_id_middleware;
use crate::openai::OpenAiClient;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value = "crashlog.db")]
    pub database: String,
    #[arg(long, default_value_t = 120)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
    /// Must stay above the 25 MiB Whisper limit so oversize audio gets a readable error.
    #[arg(long, default_value_t = 30 * 1024 * 1024)]
    pub max_body_size: usize,
    /// Only reuse a crash report created within this many minutes. Unlimited when unset.
    #[arg(long)]
    pub report_reuse_window_mins: Option<i64>,
    #[arg(long, default_value = ".")]
    pub log_dir: String,
}

impl Default for Args {
    fn default() -> Self {
        Args::parse_from(["crashlog"])
    }
}

#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    pub db: DbPool,
    pub openai: OpenAiClient,
    pub settings: Arc<Settings>,
    pub reporter: ErrorReporter,
    pub args: Arc<Args>,
}

impl AppState {
    pub fn new(http: reqwest::Client, db: DbPool, settings: Settings, args: Args) -> Self {
        let openai = OpenAiClient::new(http.clone(), &settings.openai);
        let reporter = ErrorReporter::new(http.clone(), &settings);
        Self {
            http,
            db,
            openai,
            settings: Arc::new(settings),
            reporter,
            args: Arc::new(args),
        }
    }
}

pub fn build_http_client(args: &Args) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(args.request_timeout_secs))
        .connect_timeout(Duration::from_secs(args.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()
}

/// Full HTTP surface. The relay route sets its own CORS headers, so the
/// shared CORS layer only wraps the other API routes.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(DefaultOnResponse::new().level(tracing::Level::INFO));

    let relay = Router::new().route(
        "/api/voiceflow/stream",
        post(crate::relay::voiceflow_stream).options(crate::relay::preflight),
    );

    let api = Router::new()
        .route("/api/chat", post(crate::chat::chat_handler))
        .route("/api/transcribe", post(crate::transcription::transcribe_handler))
        .route("/api/elevenlabs/chat", post(crate::elevenlabs::webhook_handler))
        .route(
            "/api/elevenlabs/signed-url",
            get(crate::elevenlabs::signed_url_handler),
        )
        .route("/api/crash-reports", get(crate::crash_reports::list_handler))
        .route(
            "/api/crash-reports/analysis",
            get(crate::crash_reports::analysis_handler),
        )
        .route("/api/voice/providers", get(crate::health::voice_providers))
        .layer(cors);

    Router::new()
        .route("/health", get(crate::health::liveness))
        .route("/readyz", get(crate::health::readiness))
        .merge(relay)
        .merge(api)
        .layer(axum::extract::DefaultBodyLimit::max(state.args.max_body_size))
        .layer(CookieManagerLayer::new())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .with_state(state)
}
