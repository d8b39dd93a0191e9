//! Turn manager: runs each user turn on a background task.
//!
//! A turn is one submitted message and the run it starts. The HTTP handler
//! only registers the turn and returns; the run driver and renderer then work
//! on a spawned task and report progress through a [`ChatEvent`] channel.
//!
//! The channel keeps every event it has published. A subscriber attaching
//! after the turn started (or even after it finished) first receives the
//! history, then live events, so the browser never misses the transcript.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::Instrument;
use uuid::Uuid;

use super::render::ResponseRenderer;
use super::run::{RunDriver, RunObserver};
use crate::assistant::Run;
use crate::error::{ChatError, Result};
use crate::events::ChatEvent;
use crate::session::Session;
use crate::ui::HtmlSurface;

const CHANNEL_CAPACITY: usize = 64;

/// Identifies an accepted turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnHandle {
    pub turn_id: String,
    pub session_id: String,
}

impl TurnHandle {
    /// Path of the turn's SSE stream.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("/api/chat/turns/{}/stream", self.turn_id)
    }
}

#[derive(Debug)]
struct ChannelState {
    history: Vec<ChatEvent>,
    // Dropped once the turn is done so live subscribers see the end of stream.
    tx: Option<broadcast::Sender<ChatEvent>>,
    finished_at: Option<Instant>,
}

/// Replaying event channel of one turn.
#[derive(Debug)]
struct TurnChannel {
    state: Mutex<ChannelState>,
}

impl TurnChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ChannelState {
                history: Vec::new(),
                tx: Some(tx),
                finished_at: None,
            }),
        }
    }

    fn publish(&self, event: ChatEvent) {
        let mut state = self.state.lock().unwrap();
        let terminal = event.is_terminal();
        state.history.push(event.clone());
        if let Some(tx) = &state.tx {
            // No receivers is fine; the history still has the event.
            let _ = tx.send(event);
        }
        if terminal {
            state.tx = None;
            state.finished_at = Some(Instant::now());
        }
    }

    fn subscribe(&self) -> (Vec<ChatEvent>, Option<broadcast::Receiver<ChatEvent>>) {
        let state = self.state.lock().unwrap();
        (
            state.history.clone(),
            state.tx.as_ref().map(broadcast::Sender::subscribe),
        )
    }

    fn finished_for(&self, now: Instant) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        state.finished_at.map(|at| now.saturating_duration_since(at))
    }
}

/// Forwards run driver progress into a turn channel.
struct ChannelObserver {
    channel: Arc<TurnChannel>,
    thinking_label: String,
}

impl RunObserver for ChannelObserver {
    fn run_created(&mut self, run: &Run) {
        self.channel.publish(ChatEvent::RunCreated {
            run_id: run.id.clone(),
            thread_id: run.thread_id.clone(),
        });
    }

    fn thinking(&mut self, _run: &Run) {
        self.channel.publish(ChatEvent::Thinking {
            label: self.thinking_label.clone(),
        });
    }

    fn polled(&mut self, run: &Run, attempt: u32) {
        self.channel.publish(ChatEvent::RunPolled {
            run_id: run.id.clone(),
            status: run.status,
            attempt,
        });
    }
}

/// Starts turns and hands out their event streams.
#[derive(Clone)]
pub struct TurnManager {
    turns: Arc<RwLock<HashMap<String, Arc<TurnChannel>>>>,
    driver: Arc<RunDriver>,
    renderer: Arc<ResponseRenderer>,
    thinking_label: String,
}

impl std::fmt::Debug for TurnManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnManager")
            .field("driver", &self.driver)
            .field("thinking_label", &self.thinking_label)
            .finish_non_exhaustive()
    }
}

impl TurnManager {
    #[must_use]
    pub fn new(driver: RunDriver, renderer: ResponseRenderer, thinking_label: impl Into<String>) -> Self {
        Self {
            turns: Arc::new(RwLock::new(HashMap::new())),
            driver: Arc::new(driver),
            renderer: Arc::new(renderer),
            thinking_label: thinking_label.into(),
        }
    }

    /// Accept `text` for `session` and run the turn in the background.
    ///
    /// Fails with [`ChatError::TurnInProgress`] while another turn of the same
    /// session is still running.
    #[tracing::instrument(
        skip(self, session, text),
        fields(session_id = %session.id(), turn_id = tracing::field::Empty)
    )]
    pub async fn submit(&self, session: &Session, text: impl Into<String>) -> Result<TurnHandle> {
        let Some(guard) = session.try_begin_turn() else {
            tracing::warn!("Turn rejected, another turn is active");
            return Err(ChatError::TurnInProgress(session.id().to_string()));
        };

        let turn_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("turn_id", turn_id.as_str());

        let channel = Arc::new(TurnChannel::new());
        self.turns
            .write()
            .await
            .insert(turn_id.clone(), Arc::clone(&channel));

        let handle = TurnHandle {
            turn_id: turn_id.clone(),
            session_id: session.id().to_string(),
        };
        channel.publish(ChatEvent::TurnStart {
            turn_id: handle.turn_id.clone(),
            session_id: handle.session_id.clone(),
        });
        tracing::info!(name: "turn.accepted", "Turn accepted");

        let driver = Arc::clone(&self.driver);
        let renderer = Arc::clone(&self.renderer);
        let session = session.clone();
        let text = text.into();
        let thinking_label = self.thinking_label.clone();
        let span = tracing::info_span!("turn", turn_id = %turn_id, session_id = %session.id());

        tokio::spawn(
            async move {
                let started = Instant::now();

                let mut observer = ChannelObserver {
                    channel: Arc::clone(&channel),
                    thinking_label,
                };
                let outcome = run_turn(&driver, &renderer, &session, &text, &mut observer).await;

                match outcome {
                    Ok(event) => {
                        channel.publish(event);
                        tracing::info!(
                            name: "turn.completed",
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Turn completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(name: "turn.failed", kind = e.kind(), error = %e, "Turn failed");
                        channel.publish(ChatEvent::Error {
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        });
                    }
                }

                session.clear_run();
                // Release the session before `done` so the client may submit again.
                drop(guard);
                channel.publish(ChatEvent::Done);
            }
            .instrument(span),
        );

        Ok(handle)
    }

    /// Event stream of a turn: everything published so far, then live events
    /// up to and including [`ChatEvent::Done`].
    pub async fn subscribe(&self, turn_id: &str) -> Option<BoxStream<'static, ChatEvent>> {
        let channel = self.turns.read().await.get(turn_id).cloned()?;
        let (history, rx) = channel.subscribe();

        let replay = stream::iter(history);
        let Some(rx) = rx else {
            return Some(replay.boxed());
        };

        let turn_id = turn_id.to_string();
        let live = BroadcastStream::new(rx).filter_map(move |item| {
            let event = match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(turn_id = %turn_id, skipped, "Turn subscriber lagged");
                    None
                }
            };
            futures::future::ready(event)
        });

        Some(replay.chain(live).boxed())
    }

    /// Forget turns that finished more than `older_than` ago.
    pub async fn prune_finished(&self, older_than: Duration) -> usize {
        let now = Instant::now();
        let mut turns = self.turns.write().await;
        let before = turns.len();
        turns.retain(|_, channel| channel.finished_for(now).is_none_or(|age| age < older_than));
        before - turns.len()
    }
}

/// Drive the run, then re-render the transcript.
async fn run_turn(
    driver: &RunDriver,
    renderer: &ResponseRenderer,
    session: &Session,
    text: &str,
    observer: &mut ChannelObserver,
) -> Result<ChatEvent> {
    driver.submit(session, text, observer).await?;

    let mut surface = HtmlSurface::new();
    let message_count = renderer.refresh(session, &mut surface).await?;
    Ok(ChatEvent::Transcript {
        html: surface.into_html(),
        message_count,
    })
}
