mod agent;
mod config;
mod db;
mod errors;
mod models;
mod routes;
mod service;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::assistant::{AssistantRunner, OpenAiAssistantApi, PollPolicy};
use crate::agent::router::InferenceRouter;
use crate::agent::RigChatBackend;
use crate::config::{AppConfig, ChatMode};
use crate::db::{MemoryThreadRepository, ThreadRepository, TranscriptStore};
use crate::errors::AppError;
use crate::routes::AppState;
use crate::routes::api_routes::{
    create_session_handler, get_thread_handler, health_handler, list_threads_handler,
    session_chat_handler,
};
use crate::routes::page_routes::{
    delete_thread_handler, index_handler, load_thread_handler, model_handler, new_thread_handler,
    page_handler, send_handler,
};
use crate::service::session::SessionRegistry;
use crate::service::session_controller::SessionController;
use crate::service::sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fyx_chat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Transcript store ──────────────────────────────────────────────────────
    let store: Arc<dyn TranscriptStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_db_connections)
                .connect(database_url)
                .await
                .map_err(AppError::DatabaseConnectionFailed)?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(AppError::DatabaseMigrationFailed)?;

            let repo = ThreadRepository::new(pool, config.thread_ttl);
            repo.ensure_expiry_index().await?;
            info!("Database connection established and migrations applied");
            Arc::new(repo)
        }
        None => {
            warn!("DATABASE_URL not set; threads are kept in memory and lost on restart");
            Arc::new(MemoryThreadRepository::new(config.thread_ttl))
        }
    };

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let primary = RigChatBackend::openai(
        &config.openai_api_key,
        &config.openai_base_url,
        &config.primary_model,
    )?;
    let alternate = RigChatBackend::ollama(&config.alternate_base_url, &config.alternate_model)?;
    info!(primary = primary.model(), alternate = alternate.model(), "Inference backends ready");

    let mut router = InferenceRouter::new(
        config.system_instruction.clone(),
        Arc::new(primary),
        Arc::new(alternate),
    );
    if config.chat_mode == ChatMode::Assistant {
        let assistant_id = config
            .assistant_id
            .as_deref()
            .ok_or_else(|| AppError::Configuration("ASSISTANT_ID must be set".to_string()))?;
        let api = OpenAiAssistantApi::new(&config.openai_base_url, &config.openai_api_key, assistant_id);
        let policy = PollPolicy { interval: config.poll_interval, deadline: config.poll_deadline };
        router = router.with_assistant(AssistantRunner::new(Arc::new(api), policy));
        info!(assistant_id, "Primary selection served by the assistant backend");
    }

    let sessions = SessionRegistry::new();
    let controller = SessionController::new(Arc::new(router), store.clone());
    let _sweeper = sweeper::spawn(
        store,
        sessions.clone(),
        config.sweep_interval,
        config.session_idle_limit,
    );

    // ── Router ────────────────────────────────────────────────────────────────
    let app = Router::new()
        // Page routes
        .route("/", get(index_handler))
        .route("/session/{sid}", get(page_handler))
        .route("/session/{sid}/send", post(send_handler))
        .route("/session/{sid}/model", post(model_handler))
        .route("/session/{sid}/new", post(new_thread_handler))
        .route("/session/{sid}/delete", post(delete_thread_handler))
        .route("/session/{sid}/threads/{tid}", get(load_thread_handler))
        // JSON API
        .route("/api/threads", get(list_threads_handler))
        .route("/api/threads/{id}", get(get_thread_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/{sid}/chat", post(session_chat_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { controller, sessions });

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
