#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]
use crashlog::config::Settings;
use crashlog::db::init_db;
use crashlog::main_helper::{app, build_http_client};
use crashlog::redaction::{RedactingMakeWriter, RedactionLevel};
use crashlog::{AppState, Args};

use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    use tracing_subscriber::prelude::*;

    let args = Args::parse();

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => "crashlog=debug,tower_http=info".into(),
    };

    // Conversation text is health data; the file sink only ever sees redacted lines.
    let file_appender = tracing_appender::rolling::daily(&args.log_dir, "crashlog.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(RedactingMakeWriter::new(non_blocking, RedactionLevel::Normal)),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    crashlog::logging::setup_panic_hook();

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(problems) => {
            eprintln!("Invalid configuration:\n{}", problems);
            std::process::exit(1);
        }
    };
    settings.log_summary();

    let db = match init_db(&args.database).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let client = match build_http_client(&args) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", args.host, args.port);
    let state = Arc::new(AppState::new(client, db, settings, args));
    let router = app(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Crashlog listening on {}", addr);
    use futures_util::FutureExt;

    let server_future = async move { axum::serve(listener, router).await };

    match std::panic::AssertUnwindSafe(server_future)
        .catch_unwind()
        .await
    {
        Ok(result) => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Err(panic_payload) => {
            let message = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                *s
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.as_str()
            } else {
                "Unknown panic"
            };
            tracing::error!(target: "panic", "CRITICAL: Server task panicked: {}", message);
            std::process::exit(1);
        }
    }
}
