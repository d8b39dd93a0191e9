//! Conversation flow against the remote assistant service.
//!
//! - [`binding`]: resolve the assistant once, resync it before runs
//! - [`thread`]: one remote thread per session
//! - [`run`]: post the user message and poll the run to a terminal status
//! - [`render`]: fetch the thread and draw it on a [`DisplaySurface`]
//! - [`turn`]: run the above on a background task and publish events

pub mod binding;
pub mod render;
pub mod run;
pub mod thread;
pub mod turn;

pub use binding::{ResyncPolicy, bind_assistant, resync_assistant};
pub use render::{DisplaySurface, RenderedImage, ResponseRenderer, decode_image};
pub use run::{NoopObserver, PollPolicy, RunDriver, RunObserver, RunPhase};
pub use thread::ensure_thread;
pub use turn::{TurnHandle, TurnManager};
