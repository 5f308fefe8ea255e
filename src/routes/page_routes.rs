use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::{ChatTurn, ModelSelection};
use crate::routes::{AppState, status_for};
use crate::service::session::Session;

// ── View models ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Persona {
    pub name: &'static str,
    pub role: &'static str,
    pub pitch: &'static str,
}

const PERSONAS: [Persona; 3] = [
    Persona {
        name: "Jamie",
        role: "the Content Creator",
        pitch: "Need a rough draft to get started? I'll cover the main points and translate your ideas into words.",
    },
    Persona {
        name: "Michael",
        role: "the Editor",
        pitch: "Let me polish your draft. I'll ensure it's clear, engaging, and perfectly matches our brand voice.",
    },
    Persona {
        name: "Emma",
        role: "the Design Consultant",
        pitch: "Ready to add a visual? I'll write a prompt that complements your draft and includes all the right brand colors and style.",
    },
];

pub struct TurnView {
    pub css: &'static str,
    pub speaker: &'static str,
    pub content: String,
}

impl From<&ChatTurn> for TurnView {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            css: turn.role().as_str(),
            speaker: turn.role().label(),
            content: turn.content().to_string(),
        }
    }
}

pub struct ThreadLink {
    pub id: String,
    pub label: String,
    pub turns: usize,
    pub active: bool,
}

pub struct ModelOption {
    pub value: &'static str,
    pub label: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    session_id: String,
    personas: Vec<Persona>,
    threads: Vec<ThreadLink>,
    turns: Vec<TurnView>,
    models: Vec<ModelOption>,
    draft: String,
    has_notice: bool,
    notice: String,
    can_delete: bool,
}

#[derive(Template)]
#[template(path = "error_fragment.html")]
struct ErrorFragmentTemplate {
    error_message: String,
}

// ── Form input ────────────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct SendForm {
    #[serde(default)]
    pub message: String,
}

#[derive(serde::Deserialize)]
pub struct ModelForm {
    pub model: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET `/`: starts a session and sends the browser to its page
pub async fn index_handler(State(state): State<AppState>) -> Redirect {
    let (session_id, _) = state.sessions.create().await;
    info!(session = %session_id, "Session started");
    Redirect::to(&session_path(&session_id))
}

/// GET `/session/{sid}`: full page
pub async fn page_handler(Path(session_id): Path<String>, State(state): State<AppState>) -> Response {
    let Some(handle) = state.sessions.get(&session_id).await else {
        return Redirect::to("/").into_response();
    };

    let threads = state.controller.list_threads().await.unwrap_or_else(|e| {
        warn!("Thread history unavailable: {e}");
        Vec::new()
    });

    let mut session = handle.lock().await;
    session.touch();
    let flags = session.flags.take();
    let active_thread = session.transcript.thread_id().to_string();
    let router = state.controller.router();

    let models = [ModelSelection::Primary, ModelSelection::Alternate]
        .into_iter()
        .map(|m| ModelOption {
            value: m.as_str(),
            label: format!("{} ({})", m.as_str(), router.backend_name(m)),
            selected: m == session.model,
        })
        .collect();

    let tmpl = IndexTemplate {
        session_id: session.id.clone(),
        personas: PERSONAS.to_vec(),
        threads: threads
            .iter()
            .map(|t| ThreadLink {
                id: t.id.clone(),
                label: t.label(),
                turns: t.messages.len(),
                active: t.id == active_thread,
            })
            .collect(),
        turns: session.transcript.turns().iter().map(TurnView::from).collect(),
        models,
        draft: if flags.clear_input { String::new() } else { flags.draft },
        has_notice: flags.notice.is_some(),
        notice: flags.notice.unwrap_or_default(),
        can_delete: !session.transcript.is_empty(),
    };
    render(tmpl)
}

/// POST `/session/{sid}/send`
pub async fn send_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Form(form): Form<SendForm>,
) -> Response {
    let mut session = match lock_for_update(&state, &session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = state.controller.submit(&mut session, &form.message).await {
        warn!(session = %session_id, "Send failed: {e}");
    }
    back_to(&session_id)
}

/// POST `/session/{sid}/model`
pub async fn model_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Form(form): Form<ModelForm>,
) -> Response {
    let mut session = match lock_for_update(&state, &session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    match form.model.parse::<ModelSelection>() {
        Ok(choice) => state.controller.select_model(&mut session, choice),
        Err(e) => session.flags.notice = Some(e.to_string()),
    }
    back_to(&session_id)
}

/// POST `/session/{sid}/new`
pub async fn new_thread_handler(Path(session_id): Path<String>, State(state): State<AppState>) -> Response {
    let mut session = match lock_for_update(&state, &session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    state.controller.new_thread(&mut session);
    back_to(&session_id)
}

/// POST `/session/{sid}/delete`
pub async fn delete_thread_handler(Path(session_id): Path<String>, State(state): State<AppState>) -> Response {
    let mut session = match lock_for_update(&state, &session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = state.controller.delete_thread(&mut session).await {
        warn!(session = %session_id, "Delete failed: {e}");
        session.flags.notice = Some(e.to_string());
    }
    back_to(&session_id)
}

/// GET `/session/{sid}/threads/{tid}`: switch to a saved thread
pub async fn load_thread_handler(
    Path((session_id, thread_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    let mut session = match lock_for_update(&state, &session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = state.controller.load_thread(&mut session, &thread_id).await {
        warn!(session = %session_id, thread = %thread_id, "Load failed: {e}");
        session.flags.notice = Some(e.to_string());
    }
    back_to(&session_id)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn session_path(session_id: &str) -> String {
    format!("/session/{session_id}")
}

fn back_to(session_id: &str) -> Response {
    Redirect::to(&session_path(session_id)).into_response()
}

/// Locks a session for a state change. Unknown sessions go back to `/`;
/// a session already handling a request is refused rather than queued.
async fn lock_for_update(
    state: &AppState,
    session_id: &str,
) -> Result<OwnedMutexGuard<Session>, Response> {
    let Some(handle) = state.sessions.get(session_id).await else {
        return Err(Redirect::to("/").into_response());
    };
    handle.try_lock_owned().map_err(|_| error_response(&AppError::SessionBusy))
}

fn render(tmpl: impl Template) -> Response {
    match tmpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Template error: {e}")).into_response(),
    }
}

fn error_response(err: &AppError) -> Response {
    let status = status_for(err);
    let tmpl = ErrorFragmentTemplate { error_message: err.to_string() };
    match tmpl.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(_) => (status, err.to_string()).into_response(),
    }
}
