//! Per-browser conversation sessions and their store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::assistant::{AssistantProfile, Run, ThreadMessage};
use crate::chat::run::RunPhase;

/// A single conversation session.
///
/// Holds the remote thread bound to this browser session, the last fetched
/// message list, the single in-flight run slot and the assistant settings the
/// session was built with. Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    /// Set once, never replaced.
    thread_id: RwLock<Option<String>>,
    /// Remote listing order (newest first).
    messages: RwLock<Vec<ThreadMessage>>,
    run: RwLock<Option<Run>>,
    profile: RwLock<AssistantProfile>,
    /// Held for the whole duration of a turn.
    turn_lock: Arc<Mutex<()>>,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

/// Serializable snapshot of a session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub thread_id: Option<String>,
    pub messages: Vec<ThreadMessage>,
    pub run: Option<Run>,
    pub file_ids: Vec<String>,
    pub assistant_instructions: Option<String>,
    pub model_id: String,
    pub created_at: String,    // RFC3339
    pub last_activity: String, // RFC3339
}

/// Builder for [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    id: String,
    profile: AssistantProfile,
    thread_id: Option<String>,
}

impl SessionBuilder {
    /// Seed the session with the bound assistant's settings.
    #[must_use]
    pub fn profile(mut self, profile: &AssistantProfile) -> Self {
        self.profile = profile.clone();
        self
    }

    /// Attach an already existing remote thread.
    #[must_use]
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Session {
        let now = Utc::now();
        Session {
            inner: Arc::new(SessionInner {
                id: self.id,
                thread_id: RwLock::new(self.thread_id),
                messages: RwLock::new(Vec::new()),
                run: RwLock::new(None),
                profile: RwLock::new(self.profile),
                turn_lock: Arc::new(Mutex::new(())),
                created_at: now,
                last_activity: RwLock::new(now),
            }),
        }
    }
}

impl Session {
    #[must_use]
    pub fn builder(id: impl Into<String>) -> SessionBuilder {
        SessionBuilder {
            id: id.into(),
            ..SessionBuilder::default()
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    // ── thread ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn thread_id(&self) -> Option<String> {
        self.inner.thread_id.read().unwrap().clone()
    }

    /// Store the remote thread id unless one is already set.
    ///
    /// Returns `true` if `thread_id` was stored.
    pub fn set_thread_id_if_absent(&self, thread_id: impl Into<String>) -> bool {
        let mut guard = self.inner.thread_id.write().unwrap();
        if guard.is_some() {
            return false;
        }
        *guard = Some(thread_id.into());
        drop(guard);
        self.touch();
        true
    }

    // ── messages ────────────────────────────────────────────────────────────

    /// Replace the stored message list (remote order, newest first).
    pub fn set_messages(&self, messages: Vec<ThreadMessage>) {
        *self.inner.messages.write().unwrap() = messages;
        self.touch();
    }

    /// Stored messages in remote order (newest first).
    #[must_use]
    pub fn messages(&self) -> Vec<ThreadMessage> {
        self.inner.messages.read().unwrap().clone()
    }

    /// Stored messages oldest first.
    #[must_use]
    pub fn chronological_messages(&self) -> Vec<ThreadMessage> {
        let mut messages = self.messages();
        messages.reverse();
        messages
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner.messages.read().unwrap().len()
    }

    // ── run slot ────────────────────────────────────────────────────────────

    pub fn set_run(&self, run: Run) {
        *self.inner.run.write().unwrap() = Some(run);
        self.touch();
    }

    #[must_use]
    pub fn run(&self) -> Option<Run> {
        self.inner.run.read().unwrap().clone()
    }

    pub fn clear_run(&self) {
        *self.inner.run.write().unwrap() = None;
    }

    /// Where the current run, if any, stands.
    #[must_use]
    pub fn run_phase(&self) -> RunPhase {
        self.inner
            .run
            .read()
            .unwrap()
            .as_ref()
            .map_or(RunPhase::NotStarted, |run| RunPhase::from(run.status))
    }

    /// Claim the session for one turn.
    ///
    /// Returns `None` while another turn holds the claim. The claim is
    /// released when the returned guard is dropped.
    #[must_use]
    pub fn try_begin_turn(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.inner.turn_lock).try_lock_owned().ok()
    }

    /// Whether a turn currently holds the claim.
    ///
    /// Reads the claim without taking it. Every live guard owns a handle to
    /// the lock, so more than one handle means the session is busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        Arc::strong_count(&self.inner.turn_lock) > 1
    }

    // ── assistant settings ──────────────────────────────────────────────────

    #[must_use]
    pub fn profile(&self) -> AssistantProfile {
        self.inner.profile.read().unwrap().clone()
    }

    #[must_use]
    pub fn file_ids(&self) -> Vec<String> {
        self.inner.profile.read().unwrap().file_ids.clone()
    }

    #[must_use]
    pub fn instructions(&self) -> Option<String> {
        self.inner.profile.read().unwrap().instructions.clone()
    }

    #[must_use]
    pub fn model_id(&self) -> String {
        self.inner.profile.read().unwrap().model.clone()
    }

    // ── bookkeeping ─────────────────────────────────────────────────────────

    pub fn to_state(&self) -> SessionState {
        let profile = self.profile();
        SessionState {
            id: self.inner.id.clone(),
            thread_id: self.thread_id(),
            messages: self.messages(),
            run: self.run(),
            file_ids: profile.file_ids,
            assistant_instructions: profile.instructions,
            model_id: profile.model,
            created_at: self.inner.created_at.to_rfc3339(),
            last_activity: self.inner.last_activity.read().unwrap().to_rfc3339(),
        }
    }

    fn touch(&self) {
        let mut guard = self.inner.last_activity.write().unwrap();
        *guard = Utc::now();
    }

    /// Check if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = *self.inner.last_activity.read().unwrap();
        // Negative duration means clock skew; treat as fresh.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Thread-safe store for sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a fresh ID.
    #[must_use]
    pub fn create(&self, profile: &AssistantProfile) -> Session {
        self.get_or_create(&Uuid::new_v4().to_string(), profile)
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().unwrap().get(id).cloned()
    }

    /// Get a session by ID, creating it if it doesn't exist.
    ///
    /// An existing session is returned untouched: its thread and messages
    /// survive any number of calls.
    #[must_use]
    pub fn get_or_create(&self, id: &str, profile: &AssistantProfile) -> Session {
        if let Some(session) = self.get(id) {
            return session;
        }

        let mut guard = self.inner.write().unwrap();
        guard
            .entry(id.to_string())
            .or_insert_with(|| Session::builder(id).profile(profile).build())
            .clone()
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.inner.write().unwrap().remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// Sessions with a turn in flight are kept. Returns the number removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self.inner.write().unwrap();
        let before = guard.len();
        guard.retain(|_, session| session.is_busy() || !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }

    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        self.inner.read().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{ContentPart, MessageRole, RunStatus};

    fn profile() -> AssistantProfile {
        AssistantProfile {
            id: "asst_1".to_string(),
            name: Some("Counsel".to_string()),
            instructions: Some("Be precise.".to_string()),
            model: "gpt-4o".to_string(),
            tools: Vec::new(),
            file_ids: vec!["file-1".to_string()],
        }
    }

    fn message(id: &str, role: MessageRole) -> ThreadMessage {
        ThreadMessage {
            id: id.to_string(),
            role,
            content: vec![ContentPart::Text {
                value: id.to_string(),
            }],
            created_at: 0,
        }
    }

    #[test]
    fn test_builder_seeds_profile() {
        let session = Session::builder("s-1").profile(&profile()).build();
        assert_eq!(session.id(), "s-1");
        assert_eq!(session.model_id(), "gpt-4o");
        assert_eq!(session.instructions().as_deref(), Some("Be precise."));
        assert_eq!(session.file_ids(), vec!["file-1"]);
        assert!(session.thread_id().is_none());
        assert_eq!(session.run_phase(), RunPhase::NotStarted);
    }

    #[test]
    fn test_thread_id_set_once() {
        let session = Session::builder("s-1").build();
        assert!(session.set_thread_id_if_absent("thread_a"));
        assert!(!session.set_thread_id_if_absent("thread_b"));
        assert_eq!(session.thread_id().as_deref(), Some("thread_a"));
    }

    #[test]
    fn test_chronological_messages() {
        let session = Session::builder("s-1").build();
        session.set_messages(vec![
            message("newest", MessageRole::Assistant),
            message("oldest", MessageRole::User),
        ]);
        let ids: Vec<_> = session
            .chronological_messages()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["oldest", "newest"]);
        assert_eq!(session.messages()[0].id, "newest");
    }

    #[test]
    fn test_run_slot() {
        let session = Session::builder("s-1").build();
        session.set_run(Run {
            id: "run_1".to_string(),
            thread_id: "thread_a".to_string(),
            status: RunStatus::InProgress,
            last_error: None,
        });
        assert_eq!(session.run_phase(), RunPhase::InProgress);
        session.clear_run();
        assert!(session.run().is_none());
    }

    #[test]
    fn test_turn_claim_is_exclusive() {
        let session = Session::builder("s-1").build();
        let guard = session.try_begin_turn();
        assert!(guard.is_some());
        assert!(session.try_begin_turn().is_none());
        drop(guard);
        assert!(session.try_begin_turn().is_some());
    }

    #[test]
    fn test_busy_check_leaves_claim_free() {
        let session = Session::builder("s-1").build();
        assert!(!session.is_busy());
        assert!(!session.is_busy());
        let guard = session.try_begin_turn().unwrap();
        assert!(session.is_busy());
        drop(guard);
        assert!(!session.is_busy());
        assert!(session.try_begin_turn().is_some());
    }

    #[test]
    fn test_cleanup_does_not_claim_idle_sessions() {
        let store = SessionStore::new();
        let fresh = store.create(&profile());

        assert_eq!(store.cleanup_expired_with_timeout(Duration::from_secs(3600)), 0);
        assert!(!fresh.is_busy());
        assert!(fresh.try_begin_turn().is_some());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new();
        let first = store.get_or_create("s-1", &profile());
        first.set_thread_id_if_absent("thread_a");
        first.set_messages(vec![message("m1", MessageRole::User)]);

        let other_profile = AssistantProfile {
            model: "other-model".to_string(),
            ..profile()
        };
        let second = store.get_or_create("s-1", &other_profile);
        assert_eq!(second.thread_id().as_deref(), Some("thread_a"));
        assert_eq!(second.message_count(), 1);
        assert_eq!(second.model_id(), "gpt-4o");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_session_store() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let session = store.create(&profile());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(session.id()).unwrap().id(), session.id());
        assert_eq!(store.list_ids(), vec![session.id().to_string()]);

        store.remove(session.id());
        assert!(store.is_empty());
    }

    #[test]
    fn test_cleanup_keeps_busy_sessions() {
        let store = SessionStore::new();
        let idle = store.create(&profile());
        let busy = store.create(&profile());
        let _claim = busy.try_begin_turn().unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let removed = store.cleanup_expired_with_timeout(Duration::ZERO);
        assert_eq!(removed, 1);
        assert!(store.get(idle.id()).is_none());
        assert!(store.get(busy.id()).is_some());
    }

    #[test]
    fn test_state_snapshot() {
        let session = Session::builder("s-1")
            .profile(&profile())
            .thread_id("thread_a")
            .build();
        let state = session.to_state();
        assert_eq!(state.thread_id.as_deref(), Some("thread_a"));
        assert_eq!(state.model_id, "gpt-4o");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["file_ids"][0], "file-1");
    }
}
