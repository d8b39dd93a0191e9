//! Session state management.
//!
//! Each browser session owns exactly one remote conversation thread plus the
//! locally cached view of it. Sessions live in memory only; restarting the
//! process forgets them (the remote thread itself is kept by the service).
//!
//! # Architecture
//!
//! - [`Session`]: one conversation, built once with [`Session::builder`]
//! - [`SessionStore`]: thread-safe map of active sessions
//!
//! # Example
//!
//! ```rust
//! use assistant_chat::assistant::AssistantProfile;
//! use assistant_chat::session::SessionStore;
//!
//! let store = SessionStore::new();
//! let profile = AssistantProfile::default();
//! let session = store.get_or_create("browser-1", &profile);
//! assert!(session.set_thread_id_if_absent("thread_abc"));
//!
//! // A second lookup returns the same session, thread intact.
//! let again = store.get_or_create("browser-1", &profile);
//! assert_eq!(again.thread_id().as_deref(), Some("thread_abc"));
//! ```

mod store;

pub use store::{Session, SessionBuilder, SessionState, SessionStore};
