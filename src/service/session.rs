use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::models::{ModelSelection, Transcript};

/// Render-time signals for the page. Consumed by the next render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiFlags {
    pub clear_input: bool,
    /// Text to put back into the input box when a send did not go through.
    pub draft: String,
    pub notice: Option<String>,
}

impl UiFlags {
    pub fn take(&mut self) -> UiFlags {
        std::mem::take(self)
    }
}

/// Everything one browser session owns.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub transcript: Transcript,
    pub model: ModelSelection,
    pub assistant_thread_id: Option<String>,
    pub flags: UiFlags,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transcript: Transcript::fresh(),
            model: ModelSelection::default(),
            assistant_thread_id: None,
            flags: UiFlags::default(),
            last_seen: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Live sessions keyed by session id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> (String, SessionHandle) {
        let id = uuid::Uuid::new_v4().to_string();
        let handle = Arc::new(Mutex::new(Session::new(id.clone())));
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), handle.clone());
        (id, handle)
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops sessions not seen for longer than `idle_limit`. Sessions busy
    /// with a request are kept.
    pub async fn evict_idle(&self, idle_limit: chrono::Duration) -> usize {
        let cutoff = Utc::now() - idle_limit;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.last_seen > cutoff,
            Err(_) => true,
        });
        before - sessions.len()
    }
}
