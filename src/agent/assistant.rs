//! Stateful assistant backend: server-side threads and asynchronous runs.
//!
//! A turn posts only the newest user message to a remote thread, starts a
//! run, polls it until it leaves `queued`/`in_progress`, then reads the first
//! message created after the one we posted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextValue {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    pub id: String,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl AssistantMessage {
    /// First text block of the message, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.value.as_str()),
            ContentPart::Other => None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<AssistantMessage>,
}

/// The remote operations the assistant path needs.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> Result<String, AppError>;

    /// Appends a user message, returning its id.
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<String, AppError>;

    async fn create_run(&self, thread_id: &str) -> Result<Run, AppError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AppError>;

    /// Messages created after `after`, oldest first.
    async fn list_messages_after(
        &self,
        thread_id: &str,
        after: &str,
    ) -> Result<Vec<AssistantMessage>, AppError>;
}

/// OpenAI Assistants v2 over plain REST.
#[derive(Clone)]
pub struct OpenAiAssistantApi {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
}

impl OpenAiAssistantApi {
    pub fn new(base_url: &str, api_key: &str, assistant_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            assistant_id: assistant_id.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        what: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        let response = request.send().await.map_err(|e| {
            error!("Assistant request '{what}' failed: {e}");
            if e.is_connect() {
                AppError::BackendUnavailable {
                    backend: "assistant".to_string(),
                    host: self.base_url.clone(),
                }
            } else {
                AppError::assistant_request(what, e)
            }
        })?;

        response
            .error_for_status()
            .map_err(|e| {
                error!("Assistant request '{what}' rejected: {e}");
                AppError::assistant_request(what, e)
            })?
            .json::<T>()
            .await
            .map_err(|e| AppError::assistant_request(format!("{what}: unreadable response"), e))
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistantApi {
    async fn create_thread(&self) -> Result<String, AppError> {
        let req = self.request(reqwest::Method::POST, "/threads").json(&serde_json::json!({}));
        let created: Created = self.send("create thread", req).await?;
        Ok(created.id)
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<String, AppError> {
        let req = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&serde_json::json!({ "role": "user", "content": content }));
        let created: Created = self.send("create message", req).await?;
        Ok(created.id)
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run, AppError> {
        let req = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
            .json(&serde_json::json!({ "assistant_id": self.assistant_id }));
        self.send("create run", req).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AppError> {
        let req = self.request(reqwest::Method::GET, &format!("/threads/{thread_id}/runs/{run_id}"));
        self.send("retrieve run", req).await
    }

    async fn list_messages_after(
        &self,
        thread_id: &str,
        after: &str,
    ) -> Result<Vec<AssistantMessage>, AppError> {
        let req = self
            .request(reqwest::Method::GET, &format!("/threads/{thread_id}/messages"))
            .query(&[("order", "asc"), ("after", after)]);
        let list: MessageList = self.send("list messages", req).await?;
        Ok(list.data)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits for as long as the run takes.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_millis(500), deadline: None }
    }
}

/// Polls `run` until it leaves `queued`/`in_progress`. Only `completed`
/// counts as success; every other terminal status is an error.
pub async fn wait_on_run(
    api: &dyn AssistantApi,
    thread_id: &str,
    mut run: Run,
    policy: PollPolicy,
) -> Result<Run, AppError> {
    let started = Instant::now();

    while run.status.is_pending() {
        if let Some(deadline) = policy.deadline {
            if started.elapsed() >= deadline {
                return Err(AppError::AssistantRunTimedOut {
                    run_id: run.id,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
        }
        run = api.retrieve_run(thread_id, &run.id).await?;
        debug!(run_id = %run.id, status = run.status.as_str(), "Polled assistant run");
        if run.status.is_pending() {
            tokio::time::sleep(policy.interval).await;
        }
    }

    match run.status {
        RunStatus::Completed => Ok(run),
        other => {
            error!(run_id = %run.id, status = other.as_str(), "Assistant run did not complete");
            Err(AppError::AssistantRunFailed { run_id: run.id, status: other.as_str().to_string() })
        }
    }
}

/// Drives one assistant turn against a persistent remote thread.
#[derive(Clone)]
pub struct AssistantRunner {
    api: Arc<dyn AssistantApi>,
    policy: PollPolicy,
}

impl AssistantRunner {
    pub fn new(api: Arc<dyn AssistantApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Sends `user_text` to the remote thread and waits for the reply.
    ///
    /// When `thread_id` is empty a remote thread is created and recorded in it
    /// before the message is posted, so a failed run leaves the caller holding
    /// the thread that already carries the message.
    pub async fn reply(&self, thread_id: &mut Option<String>, user_text: &str) -> Result<String, AppError> {
        let thread_id: &str = match thread_id {
            Some(id) => id,
            slot @ None => {
                let id = self.api.create_thread().await?;
                info!(thread_id = %id, "Created assistant thread");
                slot.insert(id)
            }
        };

        let message_id = self.api.create_message(thread_id, user_text).await?;
        let run = self.api.create_run(thread_id).await?;
        let run = wait_on_run(self.api.as_ref(), thread_id, run, self.policy).await?;

        let messages = self.api.list_messages_after(thread_id, &message_id).await?;
        let (reply_id, text) = messages
            .iter()
            .find_map(|m| m.text().map(|text| (m.id.as_str(), text)))
            .ok_or_else(|| AppError::AssistantReplyMissing { run_id: run.id.clone() })?;
        debug!(thread_id, message_id = reply_id, "Assistant reply received");

        Ok(text.to_string())
    }
}
