use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::models::{ChatRequest, ChatResponse};
use crate::routes::{AppState, status_for};
use crate::service::session_controller::SubmitOutcome;

/// GET `/api/threads`: saved threads, newest first
pub async fn list_threads_handler(State(state): State<AppState>) -> Response {
    match state.controller.list_threads().await {
        Ok(threads) => Json(threads).into_response(),
        Err(e) => error_json(&e),
    }
}

/// GET `/api/threads/{id}`: one saved thread with its messages
pub async fn get_thread_handler(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    match state.controller.get_thread(&id).await {
        Ok(thread) => Json(thread).into_response(),
        Err(e) => error_json(&e),
    }
}

/// POST `/api/sessions`: starts a session for API clients
pub async fn create_session_handler(State(state): State<AppState>) -> Response {
    let (session_id, _) = state.sessions.create().await;
    Json(json!({ "session_id": session_id })).into_response()
}

/// POST `/api/sessions/{sid}/chat`: one turn, JSON in and out
pub async fn session_chat_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let Some(handle) = state.sessions.get(&session_id).await else {
        return error_json(&AppError::SessionNotFound { id: session_id });
    };
    let Ok(mut session) = handle.try_lock_owned() else {
        return error_json(&AppError::SessionBusy);
    };

    if let Some(model) = request.model {
        state.controller.select_model(&mut session, model);
    }

    match state.controller.submit(&mut session, &request.message).await {
        Err(e) => error_json(&e),
        Ok(outcome) => {
            // JSON clients get errors inline; page flags are not for them.
            session.flags.take();
            let (reply, saved) = match outcome {
                SubmitOutcome::Ignored => (None, false),
                SubmitOutcome::Replied { reply, saved } => (Some(reply), saved),
            };
            Json(ChatResponse {
                thread_id: session.transcript.thread_id().to_string(),
                model: session.model,
                reply,
                saved,
                messages: session.transcript.turns().to_vec(),
            })
            .into_response()
        }
    }
}

/// GET `/health`
pub async fn health_handler() -> &'static str {
    "ok"
}

fn error_json(err: &AppError) -> Response {
    (status_for(err), Json(json!({ "error": err.to_string() }))).into_response()
}
