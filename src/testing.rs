//! Test doubles for the backend, assistant and store seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::assistant::{AssistantApi, AssistantMessage, ContentPart, Run, RunStatus, TextValue};
use crate::agent::{ChatBackend, PromptMessage};
use crate::db::TranscriptStore;
use crate::errors::AppError;
use crate::models::ThreadRecord;

/// Replies `"{name} reply {n}"` to the n-th call, or always fails.
pub struct StubBackend {
    name: String,
    fail: bool,
    calls: Mutex<Vec<Vec<PromptMessage>>>,
}

impl StubBackend {
    pub fn replying(name: &str) -> Arc<Self> {
        Arc::new(Self { name: name.to_string(), fail: false, calls: Mutex::new(Vec::new()) })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self { name: name.to_string(), fail: true, calls: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> Vec<Vec<PromptMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AppError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(messages.to_vec());
        if self.fail {
            return Err(AppError::InferenceError { message: format!("{} is down", self.name) });
        }
        Ok(format!("{} reply {}", self.name, calls.len()))
    }
}

/// Plays back a fixed run-status sequence: the first status comes from
/// `create_run`, each `retrieve_run` yields the next, and the last repeats.
pub struct ScriptedAssistant {
    statuses: Mutex<VecDeque<RunStatus>>,
    reply: Option<String>,
    fetches: AtomicUsize,
    threads: AtomicUsize,
    posted: Mutex<Vec<String>>,
}

impl ScriptedAssistant {
    pub fn new(statuses: &[RunStatus]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            reply: None,
            fetches: AtomicUsize::new(0),
            threads: AtomicUsize::new(0),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    pub fn status_fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn threads_created(&self) -> usize {
        self.threads.load(Ordering::SeqCst)
    }

    pub fn posted_messages(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }

    fn next_status(&self) -> RunStatus {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(RunStatus::Unknown)
        } else {
            statuses.front().copied().unwrap_or(RunStatus::Unknown)
        }
    }
}

#[async_trait]
impl AssistantApi for ScriptedAssistant {
    async fn create_thread(&self) -> Result<String, AppError> {
        let n = self.threads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread_{n}"))
    }

    async fn create_message(&self, _thread_id: &str, content: &str) -> Result<String, AppError> {
        let mut posted = self.posted.lock().unwrap();
        posted.push(content.to_string());
        Ok(format!("msg_{}", posted.len()))
    }

    async fn create_run(&self, _thread_id: &str) -> Result<Run, AppError> {
        Ok(Run { id: "run_1".to_string(), status: self.next_status() })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Run { id: run_id.to_string(), status: self.next_status() })
    }

    async fn list_messages_after(
        &self,
        _thread_id: &str,
        _after: &str,
    ) -> Result<Vec<AssistantMessage>, AppError> {
        Ok(self
            .reply
            .iter()
            .map(|text| AssistantMessage {
                id: "msg_reply".to_string(),
                content: vec![ContentPart::Text { text: TextValue { value: text.clone() } }],
            })
            .collect())
    }
}

/// A store whose every operation fails.
pub struct FailingStore;

fn unavailable(what: &str) -> AppError {
    AppError::db_query(format!("{what} failed"), sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl TranscriptStore for FailingStore {
    async fn upsert(&self, _record: &ThreadRecord) -> Result<(), AppError> {
        Err(unavailable("upsert"))
    }

    async fn find_all(&self) -> Result<Vec<ThreadRecord>, AppError> {
        Err(unavailable("find_all"))
    }

    async fn find_by_id(&self, _id: &str) -> Result<Option<ThreadRecord>, AppError> {
        Err(unavailable("find_by_id"))
    }

    async fn delete(&self, _id: &str) -> Result<bool, AppError> {
        Err(unavailable("delete"))
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        Err(unavailable("purge_expired"))
    }
}

/// Handler state over an in-memory store, `primary` as the primary backend
/// and a replying stub named "alternate".
pub fn app_state(primary: Arc<StubBackend>) -> crate::routes::AppState {
    use crate::agent::router::InferenceRouter;
    use crate::db::MemoryThreadRepository;
    use crate::service::session::SessionRegistry;
    use crate::service::session_controller::SessionController;

    let router = InferenceRouter::new("Be helpful.", primary, StubBackend::replying("alternate"));
    let store = Arc::new(MemoryThreadRepository::new(chrono::Duration::days(30)));
    crate::routes::AppState {
        controller: SessionController::new(Arc::new(router), store),
        sessions: SessionRegistry::new(),
    }
}
