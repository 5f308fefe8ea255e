use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    /// Speaker label used when a transcript is rendered as lines.
    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::User => "You",
            MessageRole::Assistant => "Assistant",
            MessageRole::System => "System",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation. Fields are private so a turn cannot change
/// after it has been appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    role: MessageRole,
    content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// The in-memory conversation owned by a single session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    thread_id: String,
    created_at: DateTime<Utc>,
    turns: Vec<ChatTurn>,
}

impl Transcript {
    /// Starts an empty transcript under a freshly allocated thread id.
    pub fn fresh() -> Self {
        Self {
            thread_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn from_record(record: &ThreadRecord) -> Self {
        Self {
            thread_id: record.id.clone(),
            created_at: record.created_at,
            turns: record.messages.clone(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Snapshot for the store; the whole message array replaces what was saved before.
    pub fn to_record(&self, assistant_thread_id: Option<String>) -> ThreadRecord {
        ThreadRecord {
            id: self.thread_id.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
            assistant_thread_id,
            messages: self.turns.clone(),
        }
    }
}

/// A persisted conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Remote thread on the stateful assistant backend, when that path served this thread.
    pub assistant_thread_id: Option<String>,
    pub messages: Vec<ChatTurn>,
}

impl ThreadRecord {
    /// Sidebar label: the creation time.
    pub fn label(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Which inference backend handles the next turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSelection {
    #[default]
    Primary,
    Alternate,
}

impl ModelSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSelection::Primary => "primary",
            ModelSelection::Alternate => "alternate",
        }
    }
}

impl FromStr for ModelSelection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(ModelSelection::Primary),
            "alternate" => Ok(ModelSelection::Alternate),
            other => Err(AppError::UnknownModel { value: other.to_string() }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub model: Option<ModelSelection>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub thread_id: String,
    pub model: ModelSelection,
    pub reply: Option<String>,
    pub saved: bool,
    pub messages: Vec<ChatTurn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_serialize_with_lowercase_roles() {
        let json = serde_json::to_value(ChatTurn::user("hello")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "user", "content": "hello" }));

        let back: ChatTurn =
            serde_json::from_value(serde_json::json!({ "role": "assistant", "content": "hi" }))
                .unwrap();
        assert_eq!(back, ChatTurn::assistant("hi"));
    }

    #[test]
    fn speaker_labels() {
        assert_eq!(ChatTurn::user("Draft a post").role().label(), "You");
        assert_eq!(ChatTurn::assistant("Sure").role().label(), "Assistant");
    }

    #[test]
    fn fresh_transcripts_get_distinct_thread_ids() {
        let a = Transcript::fresh();
        let b = Transcript::fresh();
        assert_ne!(a.thread_id(), b.thread_id());
        assert!(a.is_empty());
    }

    #[test]
    fn record_snapshot_keeps_identity_and_order() {
        let mut transcript = Transcript::fresh();
        transcript.push(ChatTurn::user("one"));
        transcript.push(ChatTurn::assistant("two"));

        let record = transcript.to_record(Some("thread_abc".into()));
        assert_eq!(record.id, transcript.thread_id());
        assert_eq!(record.created_at, transcript.created_at());
        assert_eq!(record.assistant_thread_id.as_deref(), Some("thread_abc"));

        let reloaded = Transcript::from_record(&record);
        assert_eq!(reloaded, transcript);
    }

    #[test]
    fn model_selection_parses_form_values() {
        assert_eq!("primary".parse::<ModelSelection>().unwrap(), ModelSelection::Primary);
        assert_eq!(" Alternate ".parse::<ModelSelection>().unwrap(), ModelSelection::Alternate);
        assert!("other".parse::<ModelSelection>().is_err());
        assert_eq!(ModelSelection::default(), ModelSelection::Primary);
    }
}
