//! Thread manager.

use crate::assistant::AssistantApi;
use crate::error::Result;
use crate::session::Session;

/// Return the session's remote thread, creating it on first use.
///
/// This is the only place a thread id is assigned to a session.
pub async fn ensure_thread(api: &dyn AssistantApi, session: &Session) -> Result<String> {
    if let Some(thread_id) = session.thread_id() {
        return Ok(thread_id);
    }

    let thread = api.create_thread().await?;
    if session.set_thread_id_if_absent(thread.id.clone()) {
        tracing::info!(
            name: "thread.created",
            session_id = %session.id(),
            thread_id = %thread.id,
            "Conversation thread created"
        );
        return Ok(thread.id);
    }

    // Lost a race with another caller; theirs is the session's thread.
    let existing = session.thread_id().unwrap_or(thread.id);
    tracing::warn!(session_id = %session.id(), thread_id = %existing, "Discarding duplicate thread");
    Ok(existing)
}
