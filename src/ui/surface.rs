//! HTML display surface.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::escape_html;
use crate::assistant::MessageRole;
use crate::chat::{DisplaySurface, RenderedImage};

/// Renders a transcript into an HTML fragment.
///
/// Markdown goes through the `markdown` crate with raw HTML disabled, so model
/// output cannot inject markup. Images are inlined as `data:` URIs.
#[derive(Debug, Default)]
pub struct HtmlSurface {
    html: String,
    open: bool,
}

impl HtmlSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    #[must_use]
    pub fn into_html(self) -> String {
        self.html
    }
}

impl DisplaySurface for HtmlSurface {
    fn clear(&mut self) {
        self.html.clear();
        self.open = false;
    }

    fn begin_message(&mut self, role: MessageRole) {
        if self.open {
            self.end_message();
        }
        self.html.push_str(&format!(
            r#"<div class="message message-{role}"><div class="message-role">{role}</div>"#,
            role = role.as_str()
        ));
        self.open = true;
    }

    fn markdown(&mut self, text: &str) {
        match markdown::to_html_with_options(text, &markdown::Options::gfm()) {
            Ok(html) => self.html.push_str(&html),
            Err(e) => {
                tracing::warn!(error = %e, "Markdown conversion failed, showing plain text");
                self.html.push_str(&format!("<p>{}</p>", escape_html(text)));
            }
        }
    }

    fn image(&mut self, image: &RenderedImage) {
        self.html.push_str(&format!(
            r#"<figure class="message-image"><img src="data:{mime};base64,{data}" width="{w}" height="{h}" alt="{alt}"></figure>"#,
            mime = image.mime,
            data = STANDARD.encode(&image.bytes),
            w = image.width,
            h = image.height,
            alt = escape_html(&image.file_id),
        ));
    }

    fn fallback(&mut self, raw: &str) {
        self.html
            .push_str(&format!(r#"<pre class="message-fallback">{}</pre>"#, escape_html(raw)));
    }

    fn end_message(&mut self) {
        if self.open {
            self.html.push_str("</div>");
            self.open = false;
        }
    }
}
