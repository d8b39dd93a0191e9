//! Response renderer.
//!
//! After a run completes, the renderer re-fetches the whole thread, stores it
//! in the session and replays it oldest first into a [`DisplaySurface`]. There
//! is no incremental update: every completed run re-renders everything.

use std::sync::Arc;

use image::GenericImageView;

use crate::assistant::{AssistantApi, ContentPart, MessageRole, ThreadMessage};
use crate::error::Result;
use crate::session::Session;

/// An image ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    /// Remote file the bytes came from.
    pub file_id: String,
    /// MIME type sniffed from the bytes.
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Output primitives the renderer draws with.
pub trait DisplaySurface: Send {
    /// Drop everything rendered so far.
    fn clear(&mut self);

    /// Open a message bubble for `role`.
    fn begin_message(&mut self, role: MessageRole);

    /// Markdown-formatted text.
    fn markdown(&mut self, text: &str);

    fn image(&mut self, image: &RenderedImage);

    /// Raw text for content the surface has no dedicated primitive for.
    fn fallback(&mut self, raw: &str);

    /// Close the bubble opened by [`DisplaySurface::begin_message`].
    fn end_message(&mut self);
}

/// Fetches thread messages and renders them.
#[derive(Clone)]
pub struct ResponseRenderer {
    api: Arc<dyn AssistantApi>,
}

impl std::fmt::Debug for ResponseRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRenderer").finish_non_exhaustive()
    }
}

impl ResponseRenderer {
    #[must_use]
    pub fn new(api: Arc<dyn AssistantApi>) -> Self {
        Self { api }
    }

    /// Re-fetch the session's thread and render it from scratch.
    ///
    /// Returns the number of messages rendered.
    pub async fn refresh(&self, session: &Session, surface: &mut dyn DisplaySurface) -> Result<usize> {
        let Some(thread_id) = session.thread_id() else {
            surface.clear();
            return Ok(0);
        };

        let messages = self.api.list_all_messages(&thread_id).await?;
        tracing::debug!(
            session_id = %session.id(),
            thread_id = %thread_id,
            message_count = messages.len(),
            "Thread messages fetched"
        );
        session.set_messages(messages);

        self.render(&session.messages(), surface).await
    }

    /// Render `messages`, given newest first, oldest first into `surface`.
    pub async fn render(
        &self,
        messages: &[ThreadMessage],
        surface: &mut dyn DisplaySurface,
    ) -> Result<usize> {
        surface.clear();
        let mut rendered = 0;

        for message in messages.iter().rev().filter(|m| m.role.is_rendered()) {
            surface.begin_message(message.role);
            for part in &message.content {
                self.render_part(part, surface).await?;
            }
            surface.end_message();
            rendered += 1;
        }

        Ok(rendered)
    }

    async fn render_part(&self, part: &ContentPart, surface: &mut dyn DisplaySurface) -> Result<()> {
        match part {
            ContentPart::Text { value } => surface.markdown(value),
            ContentPart::ImageFile { file_id } => {
                let bytes = self.api.file_content(file_id).await?;
                match decode_image(file_id, bytes) {
                    Some(image) => surface.image(&image),
                    None => surface.fallback(&format!("[image {file_id} could not be decoded]")),
                }
            }
            ContentPart::Other { raw } => {
                surface.fallback(&serde_json::to_string(raw).unwrap_or_else(|_| raw.to_string()));
            }
        }
        Ok(())
    }
}

/// Sniff and decode image bytes.
///
/// Returns `None` (and logs) when the bytes are not an image this build can
/// decode; the caller shows a placeholder instead.
pub fn decode_image(file_id: &str, bytes: Vec<u8>) -> Option<RenderedImage> {
    let format = match image::guess_format(&bytes) {
        Ok(format) => format,
        Err(e) => {
            tracing::warn!(file_id, size = bytes.len(), error = %e, "Unrecognised image format");
            return None;
        }
    };

    match image::load_from_memory_with_format(&bytes, format) {
        Ok(decoded) => {
            let (width, height) = decoded.dimensions();
            Some(RenderedImage {
                file_id: file_id.to_string(),
                mime: format.to_mime_type(),
                width,
                height,
                bytes,
            })
        }
        Err(e) => {
            tracing::warn!(file_id, format = ?format, error = %e, "Image failed to decode");
            None
        }
    }
}
