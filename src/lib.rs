//! Assistant chat
//!
//! A browser chat front-end for a hosted assistant service built on thread,
//! run and message primitives. Each browser session owns one remote thread;
//! every submitted message starts a run that is polled to completion on a
//! background task, after which the whole thread is re-rendered.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with one HTML page and an SSE event stream
//! - **Remote client**: typed `reqwest` client for the assistants API
//! - **Chat flow**: assistant binding, thread manager, run driver, renderer
//!
//! # Modules
//!
//! - [`assistant`]: remote data model, [`assistant::AssistantApi`] and its HTTP client
//! - [`chat`]: conversation flow and the turn manager
//! - [`config`]: application config and required secrets
//! - [`events`]: SSE event model
//! - [`session`]: per-browser session state
//! - [`ui`]: chat page and HTML display surface

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod assistant;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod ui;

use std::sync::Arc;

use assistant::AssistantApi;
use chat::{PollPolicy, ResponseRenderer, ResyncPolicy, RunDriver, TurnManager, bind_assistant};
use config::AppConfig;
use error::Result;
use session::{Session, SessionStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<AppConfig>,
    /// Remote assistant every session is bound to.
    pub assistant_id: Arc<str>,
    pub sessions: SessionStore,
    pub turns: TurnManager,
    api: Arc<dyn AssistantApi>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("assistant_id", &self.assistant_id)
            .field("sessions", &self.sessions)
            .field("turns", &self.turns)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the chat flow on top of `api`.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, api: Arc<dyn AssistantApi>, assistant_id: &str) -> Self {
        let driver = RunDriver::new(
            Arc::clone(&api),
            PollPolicy::from(&config.polling),
            ResyncPolicy::from_flag(config.assistant.resync_before_run),
        );
        let renderer = ResponseRenderer::new(Arc::clone(&api));
        let turns = TurnManager::new(driver, renderer, config.ui.thinking_label.clone());

        Self {
            config,
            assistant_id: Arc::from(assistant_id),
            sessions: SessionStore::new(),
            turns,
            api,
        }
    }

    /// Return the session `id`, or start a new one.
    ///
    /// A new session is bound to the assistant as it is on the service right
    /// now. An existing session keeps the settings it started with.
    pub async fn activate_session(&self, id: Option<&str>) -> Result<Session> {
        if let Some(session) = id.and_then(|id| self.sessions.get(id)) {
            return Ok(session);
        }

        let profile = bind_assistant(
            self.api.as_ref(),
            &self.assistant_id,
            self.config.assistant.model_override.as_deref(),
        )
        .await?;

        let session = match id {
            Some(id) => self.sessions.get_or_create(id, &profile),
            None => self.sessions.create(&profile),
        };
        tracing::debug!(session_id = %session.id(), "Session activated");
        Ok(session)
    }
}
