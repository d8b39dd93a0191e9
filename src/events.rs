//! Turn progress events sent to the browser over SSE.
//!
//! Every turn produces the same shape of stream:
//!
//! ```text
//! turn.start → run.created → run.thinking → run.status* → (transcript | error) → done
//! ```
//!
//! `done` is always last, including after an error, so a client can close its
//! `EventSource` on it unconditionally.
//!
//! # Example
//!
//! ```rust
//! use assistant_chat::events::ChatEvent;
//!
//! assert_eq!(ChatEvent::Done.event_name(), "done");
//! ```

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::assistant::RunStatus;

/// Events published while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// The turn was accepted.
    #[serde(rename = "turn.start")]
    TurnStart { turn_id: String, session_id: String },

    /// The remote run exists.
    #[serde(rename = "run.created")]
    RunCreated { run_id: String, thread_id: String },

    /// The run is pending; show a progress indicator. Sent once per turn.
    #[serde(rename = "run.thinking")]
    Thinking { label: String },

    /// One status check came back.
    #[serde(rename = "run.status")]
    RunPolled {
        run_id: String,
        status: RunStatus,
        attempt: u32,
    },

    /// The whole conversation re-rendered after a completed run.
    #[serde(rename = "transcript")]
    Transcript { html: String, message_count: usize },

    /// The turn failed.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable error category.
        kind: String,
        message: String,
    },

    #[serde(rename = "done")]
    Done,
}

impl ChatEvent {
    /// SSE event name; matches the serialized `type` tag.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TurnStart { .. } => "turn.start",
            Self::RunCreated { .. } => "run.created",
            Self::Thinking { .. } => "run.thinking",
            Self::RunPolled { .. } => "run.status",
            Self::Transcript { .. } => "transcript",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Nothing follows this event in a turn's stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Wrap a turn's event stream into an axum SSE response.
pub fn build_sse_response<S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send>
where
    S: Stream<Item = ChatEvent> + Send + 'static,
{
    let stream = stream.map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.event_name()).data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
