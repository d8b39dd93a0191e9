//! Error types for the chat front-end.
//!
//! Every fallible operation in the crate returns [`ChatError`]. Nothing is
//! retried locally: errors propagate to the HTTP handler or the turn task,
//! which reports them to the browser.

use thiserror::Error;

use crate::assistant::RunStatus;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum ChatError {
    /// A required setting is missing or empty.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The assistant identifier did not resolve on the remote service.
    #[error("Assistant lookup failed for '{assistant_id}': {message}")]
    RemoteLookup {
        /// Identifier that was looked up.
        assistant_id: String,
        /// Message returned by the remote service.
        message: String,
    },

    /// Transport failure talking to the remote service.
    #[error("Remote call failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("Remote call failed ({status}) on {operation}: {message}")]
    RemoteCall {
        /// Name of the remote operation.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Body or error message returned by the remote service.
        message: String,
    },

    /// The remote service returned a body that could not be decoded.
    #[error("Malformed response from remote service: {0}")]
    Decode(#[from] serde_json::Error),

    /// A run ended in a terminal state other than `completed`.
    #[error("Run {run_id} ended with status '{status}': {reason}")]
    RunFailed {
        /// Remote run identifier.
        run_id: String,
        /// Terminal status observed.
        status: RunStatus,
        /// Error detail reported by the service, if any.
        reason: String,
    },

    /// A run did not reach a terminal state within the poll budget.
    #[error("Run {run_id} still '{status}' after {attempts} polls ({elapsed_secs}s)")]
    RunTimedOut {
        /// Remote run identifier.
        run_id: String,
        /// Last status observed.
        status: RunStatus,
        /// Number of status checks performed.
        attempts: u32,
        /// Wall time spent polling.
        elapsed_secs: u64,
    },

    /// The session already has a turn in flight.
    #[error("Session {0} already has a turn in progress")]
    TurnInProgress(String),

    /// No session with the given identifier exists.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl ChatError {
    /// Stable, machine-readable error kind used in SSE error events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::RemoteLookup { .. } => "remote_lookup",
            Self::Transport(_) | Self::RemoteCall { .. } | Self::Decode(_) => "remote_call",
            Self::RunFailed { .. } => "run_failed",
            Self::RunTimedOut { .. } => "run_timed_out",
            Self::TurnInProgress(_) => "turn_in_progress",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }

    /// Whether this error is a remote-service failure of any kind.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RemoteCall { .. } | Self::Decode(_) | Self::RemoteLookup { .. }
        )
    }
}

/// Result type alias for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_message() {
        let err = ChatError::RunFailed {
            run_id: "run_1".to_string(),
            status: RunStatus::Expired,
            reason: "no reason given".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Run run_1 ended with status 'expired': no reason given"
        );
        assert_eq!(err.kind(), "run_failed");
        assert!(!err.is_remote());
    }

    #[test]
    fn test_remote_kinds() {
        let err = ChatError::RemoteCall {
            operation: "create_thread",
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.kind(), "remote_call");
        assert!(err.is_remote());
    }
}
