use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Database errors ──────────────────────────────────────────────────────
    #[error("Database connection failed: {0}")]
    DatabaseConnectionFailed(#[source] sqlx::Error),

    #[error("Database migration failed: {0}")]
    DatabaseMigrationFailed(#[source] sqlx::migrate::MigrateError),

    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Thread '{id}' not found")]
    ThreadNotFound { id: String },

    // ── Inference backend errors ─────────────────────────────────────────────
    #[error("{backend} backend unavailable at {host}")]
    BackendUnavailable { backend: String, host: String },

    #[error("Model '{model_name}' not found on the {backend} backend")]
    ModelNotFound { backend: String, model_name: String },

    #[error("Inference error: {message}")]
    InferenceError { message: String },

    #[error("Assistant request failed: {message}")]
    AssistantRequestFailed {
        message: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Assistant run '{run_id}' ended with status '{status}'")]
    AssistantRunFailed { run_id: String, status: String },

    #[error("Assistant run '{run_id}' did not finish within {waited_secs}s")]
    AssistantRunTimedOut { run_id: String, waited_secs: u64 },

    #[error("Assistant run '{run_id}' completed without a reply")]
    AssistantReplyMissing { run_id: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("Unknown model selection '{value}'")]
    UnknownModel { value: String },

    // ── Session errors ───────────────────────────────────────────────────────
    #[error("Session '{id}' not found")]
    SessionNotFound { id: String },

    #[error("A reply is still being generated for this session")]
    SessionBusy,

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn assistant_request(message: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::AssistantRequestFailed { message: message.into(), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::ThreadNotFound { .. } | AppError::SessionNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::FieldTooLong { .. } | AppError::UnknownModel { .. })
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, AppError::BackendUnavailable { .. })
    }

    /// Failures of the remote inference call for a turn.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            AppError::ModelNotFound { .. }
                | AppError::InferenceError { .. }
                | AppError::AssistantRequestFailed { .. }
                | AppError::AssistantRunFailed { .. }
                | AppError::AssistantRunTimedOut { .. }
                | AppError::AssistantReplyMissing { .. }
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, AppError::SessionBusy)
    }
}
