use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_PRIMARY_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ALTERNATE_MODEL: &str = "llama3.2";
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Fyx, a team of digital humans writing content. \
    Jamie drafts, Michael edits for clarity and brand voice, \
    Emma writes image prompts that match the brand colours and style. \
    Be concise and practical.";

/// Which backend serves the primary model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Stateless chat completion, full history on every call.
    Completion,
    /// Stateful assistant threads with polled runs.
    Assistant,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub max_db_connections: u32,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub primary_model: String,

    pub alternate_base_url: String,
    pub alternate_model: String,

    pub chat_mode: ChatMode,
    pub assistant_id: Option<String>,
    pub poll_interval: Duration,
    pub poll_deadline: Option<Duration>,

    pub system_instruction: String,

    pub thread_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub session_idle_limit: chrono::Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests can feed a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let openai_api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| AppError::Configuration("OPENAI_API_KEY must be set".to_string()))?;

        let chat_mode = match get("CHAT_MODE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("completion") => ChatMode::Completion,
            Some("assistant") => ChatMode::Assistant,
            Some(other) => {
                return Err(AppError::Configuration(format!(
                    "CHAT_MODE must be 'completion' or 'assistant', got '{other}'"
                )));
            }
        };

        let assistant_id = get("ASSISTANT_ID");
        if chat_mode == ChatMode::Assistant && assistant_id.is_none() {
            return Err(AppError::Configuration(
                "ASSISTANT_ID must be set when CHAT_MODE=assistant".to_string(),
            ));
        }

        let system_instruction = match (get("SYSTEM_INSTRUCTION"), get("SYSTEM_INSTRUCTION_FILE")) {
            (Some(text), _) => text,
            (None, Some(path)) => {
                let path = PathBuf::from(path);
                std::fs::read_to_string(&path).map_err(|e| {
                    AppError::Configuration(format!(
                        "cannot read SYSTEM_INSTRUCTION_FILE {}: {e}",
                        path.display()
                    ))
                })?
            }
            (None, None) => DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        };

        let poll_deadline_secs: u64 = parse_or(&get, "ASSISTANT_POLL_TIMEOUT_SECS", 0)?;
        let sweep_interval_secs: u64 = parse_at_least_one(&get, "EXPIRY_SWEEP_INTERVAL_SECS", 3600)?;
        let thread_ttl_days: i64 = parse_at_least_one(&get, "THREAD_TTL_DAYS", 30)?;
        let session_idle_minutes: i64 = parse_at_least_one(&get, "SESSION_IDLE_MINUTES", 12 * 60)?;
        let thread_ttl = chrono::Duration::try_days(thread_ttl_days)
            .ok_or_else(|| AppError::Configuration("THREAD_TTL_DAYS is out of range".to_string()))?;
        let session_idle_limit = chrono::Duration::try_minutes(session_idle_minutes)
            .ok_or_else(|| AppError::Configuration("SESSION_IDLE_MINUTES is out of range".to_string()))?;

        Ok(Self {
            port: parse_or(&get, "PORT", 8080)?,
            database_url: get("DATABASE_URL"),
            max_db_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            openai_api_key,
            openai_base_url: get("OPENAI_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            primary_model: get("PRIMARY_MODEL").unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
            alternate_base_url: get("OLLAMA_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
            alternate_model: get("ALTERNATE_MODEL")
                .unwrap_or_else(|| DEFAULT_ALTERNATE_MODEL.to_string()),
            chat_mode,
            assistant_id,
            poll_interval: Duration::from_millis(parse_or(&get, "ASSISTANT_POLL_INTERVAL_MS", 500)?),
            poll_deadline: (poll_deadline_secs > 0).then(|| Duration::from_secs(poll_deadline_secs)),
            system_instruction,
            thread_ttl,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            session_idle_limit,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Configuration(format!("{key}='{raw}' is invalid: {e}"))),
    }
}

fn parse_at_least_one<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value < T::from(1) {
        return Err(AppError::Configuration(format!("{key} must be at least 1")));
    }
    Ok(value)
}
