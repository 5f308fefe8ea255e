use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::agent::router::InferenceRouter;
use crate::db::TranscriptStore;
use crate::errors::AppError;
use crate::models::{ChatTurn, ModelSelection, ThreadRecord, Transcript};
use crate::service::session::Session;

const MAX_MESSAGE_LENGTH: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing was appended or sent.
    Ignored,
    Replied { reply: String, saved: bool },
}

/// Orchestrates turns for a session: append, route, append, persist.
#[derive(Clone)]
pub struct SessionController {
    router: Arc<InferenceRouter>,
    store: Arc<dyn TranscriptStore>,
}

impl SessionController {
    pub fn new(router: Arc<InferenceRouter>, store: Arc<dyn TranscriptStore>) -> Self {
        Self { router, store }
    }

    pub fn router(&self) -> &InferenceRouter {
        &self.router
    }

    /// Runs one exchange. A backend failure leaves the user turn in the
    /// transcript without a reply; a store failure only costs durability.
    pub async fn submit(&self, session: &mut Session, text: &str) -> Result<SubmitOutcome, AppError> {
        session.touch();

        // ── Validation ────────────────────────────────────────────────────────
        if text.trim().is_empty() {
            debug!(session = %session.id, "Ignoring blank message");
            return Ok(SubmitOutcome::Ignored);
        }
        if text.len() > MAX_MESSAGE_LENGTH {
            let err = AppError::FieldTooLong {
                field_name: "message".to_string(),
                max_length: MAX_MESSAGE_LENGTH,
                actual_length: text.len(),
            };
            session.flags.draft = text.to_string();
            session.flags.notice = Some(err.to_string());
            return Err(err);
        }

        // ── Append the user turn and ask the selected backend ────────────────
        session.transcript.push(ChatTurn::user(text));

        let reply = match self
            .router
            .reply(session.transcript.turns(), session.model, &mut session.assistant_thread_id)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    session = %session.id,
                    thread = %session.transcript.thread_id(),
                    "Turn failed on {} backend: {e}",
                    self.router.backend_name(session.model)
                );
                session.flags.clear_input = false;
                session.flags.draft = text.to_string();
                session.flags.notice = Some(e.to_string());
                return Err(e);
            }
        };

        session.transcript.push(ChatTurn::assistant(reply.as_str()));

        // ── Persist the snapshot ──────────────────────────────────────────────
        let record = session.transcript.to_record(session.assistant_thread_id.clone());
        let saved = match self.store.upsert(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!(thread = %record.id, "Transcript not saved: {e}");
                false
            }
        };

        session.flags.clear_input = true;
        session.flags.draft.clear();
        session.flags.notice = (!saved).then(|| "This reply could not be saved.".to_string());

        info!(thread = %record.id, turns = session.transcript.len(), saved, "Turn completed");
        Ok(SubmitOutcome::Replied { reply, saved })
    }

    /// Takes effect from the next submit on.
    pub fn select_model(&self, session: &mut Session, choice: ModelSelection) {
        session.touch();
        if session.model != choice {
            debug!(session = %session.id, model = choice.as_str(), "Model selection changed");
        }
        session.model = choice;
    }

    pub fn new_thread(&self, session: &mut Session) {
        session.touch();
        session.transcript = Transcript::fresh();
        session.assistant_thread_id = None;
        session.flags = Default::default();
        debug!(
            session = %session.id,
            thread = %session.transcript.thread_id(),
            created_at = %session.transcript.created_at(),
            "Started new thread"
        );
    }

    /// Replaces the session's transcript with a saved thread.
    pub fn load_thread_record(&self, session: &mut Session, record: &ThreadRecord) {
        session.touch();
        session.transcript = Transcript::from_record(record);
        session.assistant_thread_id = record.assistant_thread_id.clone();
        session.flags = Default::default();
        debug!(session = %session.id, thread = %record.id, turns = record.messages.len(), "Loaded thread");
    }

    pub async fn load_thread(&self, session: &mut Session, thread_id: &str) -> Result<(), AppError> {
        let record = self
            .store
            .find_by_id(thread_id)
            .await?
            .ok_or_else(|| AppError::ThreadNotFound { id: thread_id.to_string() })?;
        self.load_thread_record(session, &record);
        Ok(())
    }

    /// Deletes the active thread and starts a fresh one.
    pub async fn delete_thread(&self, session: &mut Session) -> Result<bool, AppError> {
        let thread_id = session.transcript.thread_id().to_string();
        let deleted = self.store.delete(&thread_id).await?;
        if !deleted {
            warn!(thread = %thread_id, "Delete requested for a thread that was never saved");
        }
        self.new_thread(session);
        Ok(deleted)
    }

    pub async fn list_threads(&self) -> Result<Vec<ThreadRecord>, AppError> {
        self.store.find_all().await
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<ThreadRecord, AppError> {
        self.store
            .find_by_id(thread_id)
            .await?
            .ok_or_else(|| AppError::ThreadNotFound { id: thread_id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryThreadRepository;
    use crate::models::MessageRole;
    use crate::agent::assistant::{AssistantRunner, PollPolicy, RunStatus};
    use crate::testing::{FailingStore, ScriptedAssistant, StubBackend};

    struct Fixture {
        controller: SessionController,
        primary: Arc<StubBackend>,
        alternate: Arc<StubBackend>,
        store: Arc<MemoryThreadRepository>,
    }

    fn fixture_with(primary: Arc<StubBackend>) -> Fixture {
        let alternate = StubBackend::replying("alternate");
        let store = Arc::new(MemoryThreadRepository::new(chrono::Duration::days(30)));
        let router = InferenceRouter::new("Be helpful.", primary.clone(), alternate.clone());
        let controller = SessionController::new(Arc::new(router), store.clone());
        Fixture { controller, primary, alternate, store }
    }

    fn fixture() -> Fixture {
        fixture_with(StubBackend::replying("primary"))
    }

    fn roles(session: &Session) -> Vec<MessageRole> {
        session.transcript.turns().iter().map(ChatTurn::role).collect()
    }

    #[tokio::test]
    async fn submit_appends_user_then_assistant_and_saves() {
        let f = fixture();
        let mut session = Session::new("s1");

        let outcome = f.controller.submit(&mut session, "Draft a post about coffee").await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Replied { reply: "primary reply 1".into(), saved: true }
        );
        assert_eq!(
            session.transcript.turns(),
            &[ChatTurn::user("Draft a post about coffee"), ChatTurn::assistant("primary reply 1")]
        );
        assert!(session.flags.clear_input);

        let saved = f.store.find_by_id(session.transcript.thread_id()).await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 2);
    }

    #[tokio::test]
    async fn blank_input_is_a_silent_no_op() {
        let f = fixture();
        let mut session = Session::new("s1");

        for blank in ["", "   ", "\n\t"] {
            let outcome = f.controller.submit(&mut session, blank).await.unwrap();
            assert_eq!(outcome, SubmitOutcome::Ignored);
        }
        assert!(session.transcript.is_empty());
        assert!(f.primary.calls().is_empty());
        assert!(f.store.find_all().await.unwrap().is_empty());
        assert!(session.flags.notice.is_none());
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_before_any_call() {
        let f = fixture();
        let mut session = Session::new("s1");

        let err = f.controller.submit(&mut session, &"x".repeat(MAX_MESSAGE_LENGTH + 1)).await.unwrap_err();
        assert!(err.is_validation());
        assert!(session.transcript.is_empty());
        assert!(f.primary.calls().is_empty());
    }

    #[tokio::test]
    async fn two_submits_alternate_roles() {
        let f = fixture();
        let mut session = Session::new("s1");

        f.controller.submit(&mut session, "one").await.unwrap();
        f.controller.submit(&mut session, "two").await.unwrap();

        assert_eq!(
            roles(&session),
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User, MessageRole::Assistant]
        );
        // The second call carried the system instruction plus three turns.
        assert_eq!(f.primary.calls()[1].len(), 4);
        let saved = f.store.find_by_id(session.transcript.thread_id()).await.unwrap().unwrap();
        assert_eq!(saved.messages, session.transcript.turns().to_vec());
    }

    #[tokio::test]
    async fn backend_failure_keeps_unanswered_user_turn_and_skips_save() {
        let f = fixture_with(StubBackend::failing("primary"));
        let mut session = Session::new("s1");

        let err = f.controller.submit(&mut session, "hello").await.unwrap_err();
        assert!(err.is_backend_failure());
        assert_eq!(session.transcript.turns(), &[ChatTurn::user("hello")]);
        assert_eq!(session.flags.draft, "hello");
        assert!(session.flags.notice.is_some());
        assert!(f.store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_does_not_block_chatting() {
        let router = InferenceRouter::new(
            "Be helpful.",
            StubBackend::replying("primary"),
            StubBackend::replying("alternate"),
        );
        let controller = SessionController::new(Arc::new(router), Arc::new(FailingStore));
        let mut session = Session::new("s1");

        let outcome = controller.submit(&mut session, "hello").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Replied { reply: "primary reply 1".into(), saved: false });
        assert_eq!(session.transcript.len(), 2);
        assert!(session.flags.notice.is_some());

        controller.submit(&mut session, "again").await.unwrap();
        assert_eq!(session.transcript.len(), 4);
    }

    #[tokio::test]
    async fn model_change_only_affects_later_turns() {
        let f = fixture();
        let mut session = Session::new("s1");

        f.controller.submit(&mut session, "first").await.unwrap();
        let before = session.transcript.turns().to_vec();

        f.controller.select_model(&mut session, ModelSelection::Alternate);
        assert_eq!(session.transcript.turns(), before.as_slice());

        f.controller.submit(&mut session, "second").await.unwrap();
        assert_eq!(&session.transcript.turns()[..2], before.as_slice());
        assert_eq!(session.transcript.turns()[3], ChatTurn::assistant("alternate reply 1"));
        assert_eq!(f.primary.calls().len(), 1);
        assert_eq!(f.alternate.calls().len(), 1);
    }

    #[tokio::test]
    async fn load_thread_replaces_the_transcript() {
        let f = fixture();
        let mut writer = Session::new("writer");
        f.controller.submit(&mut writer, "about tea").await.unwrap();
        let saved_id = writer.transcript.thread_id().to_string();

        let mut reader = Session::new("reader");
        f.controller.submit(&mut reader, "about coffee").await.unwrap();
        f.controller.load_thread(&mut reader, &saved_id).await.unwrap();

        assert_eq!(reader.transcript.thread_id(), saved_id);
        assert_eq!(reader.transcript.turns(), writer.transcript.turns());
        assert!(reader.transcript.turns().iter().all(|t| !t.content().contains("coffee")));
    }

    #[tokio::test]
    async fn loading_unknown_thread_is_not_found() {
        let f = fixture();
        let mut session = Session::new("s1");
        let err = f.controller.load_thread(&mut session, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn new_thread_resets_transcript_and_remote_thread() {
        let f = fixture();
        let mut session = Session::new("s1");
        f.controller.submit(&mut session, "hello").await.unwrap();
        session.assistant_thread_id = Some("thread_1".into());
        let old_id = session.transcript.thread_id().to_string();

        f.controller.new_thread(&mut session);
        assert!(session.transcript.is_empty());
        assert_ne!(session.transcript.thread_id(), old_id);
        assert!(session.assistant_thread_id.is_none());
    }

    #[tokio::test]
    async fn delete_thread_removes_it_and_starts_fresh() {
        let f = fixture();
        let mut session = Session::new("s1");
        f.controller.submit(&mut session, "hello").await.unwrap();
        let old_id = session.transcript.thread_id().to_string();

        assert!(f.controller.delete_thread(&mut session).await.unwrap());
        assert!(f.store.find_by_id(&old_id).await.unwrap().is_none());
        assert!(session.transcript.is_empty());
        assert_ne!(session.transcript.thread_id(), old_id);
    }

    #[tokio::test]
    async fn failed_assistant_turn_keeps_remote_thread_for_retry() {
        let api = Arc::new(ScriptedAssistant::new(&[RunStatus::Failed, RunStatus::Completed]).with_reply("drafted"));
        let policy = PollPolicy { interval: std::time::Duration::ZERO, deadline: None };
        let router = InferenceRouter::new("Be helpful.", StubBackend::replying("primary"), StubBackend::replying("alternate"))
            .with_assistant(AssistantRunner::new(api.clone(), policy));
        let store = Arc::new(MemoryThreadRepository::new(chrono::Duration::days(30)));
        let controller = SessionController::new(Arc::new(router), store);
        let mut session = Session::new("s1");

        let err = controller.submit(&mut session, "one").await.unwrap_err();
        assert!(err.is_backend_failure());
        assert_eq!(session.assistant_thread_id.as_deref(), Some("thread_1"));

        controller.submit(&mut session, "two").await.unwrap();
        assert_eq!(session.assistant_thread_id.as_deref(), Some("thread_1"));
        assert_eq!(api.threads_created(), 1);
        assert_eq!(api.posted_messages(), vec!["one".to_string(), "two".to_string()]);
    }
}
