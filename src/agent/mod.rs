pub mod assistant;
pub mod router;

use async_trait::async_trait;
use rig::client::Nothing;
use rig::completion::Chat;
use rig::message::Message as RigMessage;
use rig::prelude::CompletionClient;
use rig::providers::{ollama, openai};
use tracing::{debug, error};

use crate::errors::AppError;
use crate::models::MessageRole;

/// A role-tagged message as sent to an inference backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// A stateless chat backend: the full message list goes out on every call
/// and a single reply text comes back.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AppError>;
}

/// A prompt list reshaped for rig's `Chat`: system text as preamble,
/// the trailing user message as prompt, everything between as history.
struct RigPrompt {
    preamble: String,
    history: Vec<RigMessage>,
    prompt: String,
}

fn to_rig_prompt(messages: &[PromptMessage]) -> Result<RigPrompt, AppError> {
    let (last, earlier) = messages.split_last().ok_or_else(|| AppError::InferenceError {
        message: "no messages to send".to_string(),
    })?;
    if last.role != MessageRole::User {
        return Err(AppError::InferenceError {
            message: format!("last message must come from the user, got {}", last.role),
        });
    }

    let preamble = earlier
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let history = earlier
        .iter()
        .filter_map(|m| match m.role {
            MessageRole::User => Some(RigMessage::user(&m.content)),
            MessageRole::Assistant => Some(RigMessage::assistant(&m.content)),
            MessageRole::System => None, // carried by the preamble
        })
        .collect();

    Ok(RigPrompt { preamble, history, prompt: last.content.clone() })
}

#[derive(Clone)]
enum Provider {
    /// Chat Completions endpoint, which OpenAI-compatible servers also expose.
    OpenAi(openai::CompletionsClient),
    Ollama(ollama::Client),
}

/// [`ChatBackend`] over a rig provider client. A fresh agent is built per
/// request so the history is replayed from the session transcript each time.
#[derive(Clone)]
pub struct RigChatBackend {
    name: String,
    provider: Provider,
    base_url: String,
    model: String,
}

impl RigChatBackend {
    pub fn openai(api_key: &str, base_url: &str, model: &str) -> Result<Self, AppError> {
        let client = openai::Client::builder()
            .api_key(api_key)
            .base_url(base_url)
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build OpenAI client: {e:?}")))?
            .completions_api();
        Ok(Self {
            name: "openai".to_string(),
            provider: Provider::OpenAi(client),
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    pub fn ollama(base_url: &str, model: &str) -> Result<Self, AppError> {
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build Ollama client: {e:?}")))?;
        Ok(Self {
            name: "ollama".to_string(),
            provider: Provider::Ollama(client),
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn classify_failure(&self, message: String) -> AppError {
        if message.contains("Connection refused") || message.contains("connect") {
            AppError::BackendUnavailable { backend: self.name.clone(), host: self.base_url.clone() }
        } else if message.contains("model") {
            AppError::ModelNotFound { backend: self.name.clone(), model_name: self.model.clone() }
        } else {
            AppError::InferenceError { message }
        }
    }
}

#[async_trait]
impl ChatBackend for RigChatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AppError> {
        let RigPrompt { preamble, history, prompt } = to_rig_prompt(messages)?;
        debug!(backend = %self.name, model = %self.model, history = history.len(), "Dispatching chat turn");

        let result = match &self.provider {
            Provider::OpenAi(client) => {
                let agent = client.agent(&self.model).preamble(&preamble).build();
                agent.chat(prompt.as_str(), history).await
            }
            Provider::Ollama(client) => {
                let agent = client.agent(&self.model).preamble(&preamble).build();
                agent.chat(prompt.as_str(), history).await
            }
        };

        result.map_err(|e| {
            error!("{} inference failed: {e}", self.name);
            self.classify_failure(e.to_string())
        })
    }
}
