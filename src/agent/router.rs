use std::sync::Arc;

use tracing::{info, instrument};

use crate::agent::assistant::AssistantRunner;
use crate::agent::{ChatBackend, PromptMessage};
use crate::errors::AppError;
use crate::models::{ChatTurn, MessageRole, ModelSelection};

/// Turns a transcript into the message list a backend expects and
/// dispatches it according to the session's model selection.
pub struct InferenceRouter {
    system_instruction: String,
    primary: Arc<dyn ChatBackend>,
    alternate: Arc<dyn ChatBackend>,
    /// When set, serves [`ModelSelection::Primary`] instead of `primary`.
    assistant: Option<AssistantRunner>,
}

impl InferenceRouter {
    pub fn new(
        system_instruction: impl Into<String>,
        primary: Arc<dyn ChatBackend>,
        alternate: Arc<dyn ChatBackend>,
    ) -> Self {
        Self { system_instruction: system_instruction.into(), primary, alternate, assistant: None }
    }

    pub fn with_assistant(mut self, runner: AssistantRunner) -> Self {
        self.assistant = Some(runner);
        self
    }

    pub fn backend_name(&self, selection: ModelSelection) -> &str {
        match selection {
            ModelSelection::Primary if self.assistant.is_some() => "assistant",
            ModelSelection::Primary => self.primary.name(),
            ModelSelection::Alternate => self.alternate.name(),
        }
    }

    /// System instruction first, then every turn in order with its own role.
    pub fn format_history(&self, turns: &[ChatTurn]) -> Vec<PromptMessage> {
        std::iter::once(PromptMessage::new(MessageRole::System, self.system_instruction.as_str()))
            .chain(turns.iter().map(|t| PromptMessage::new(t.role(), t.content())))
            .collect()
    }

    /// Runs one turn. `turns` must end with the user message being answered.
    /// The assistant path fills `assistant_thread_id` as soon as it opens a
    /// remote thread, even if the turn then fails; the stateless backends
    /// leave it untouched.
    #[instrument(skip(self, turns, assistant_thread_id), fields(turns = turns.len()))]
    pub async fn reply(
        &self,
        turns: &[ChatTurn],
        selection: ModelSelection,
        assistant_thread_id: &mut Option<String>,
    ) -> Result<String, AppError> {
        match (selection, &self.assistant) {
            (ModelSelection::Primary, Some(runner)) => {
                let newest = turns
                    .last()
                    .filter(|t| t.role() == MessageRole::User)
                    .ok_or_else(|| AppError::InferenceError {
                        message: "no user message to send".to_string(),
                    })?;
                let text = runner.reply(assistant_thread_id, newest.content()).await?;
                info!(thread_id = assistant_thread_id.as_deref(), "Assistant replied");
                Ok(text)
            }
            (ModelSelection::Primary, None) => self.complete(&self.primary, turns).await,
            (ModelSelection::Alternate, _) => self.complete(&self.alternate, turns).await,
        }
    }

    async fn complete(&self, backend: &Arc<dyn ChatBackend>, turns: &[ChatTurn]) -> Result<String, AppError> {
        let messages = self.format_history(turns);
        let text = backend.complete(&messages).await?;
        info!(backend = backend.name(), "Backend replied");
        Ok(text)
    }
}
