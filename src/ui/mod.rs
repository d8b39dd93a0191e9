//! Browser UI: the chat page and the HTML display surface.
//!
//! The page is a single server-rendered document. A small inline script posts
//! the user's message to `/api/chat` and shows it at once, follows the returned
//! SSE stream and swaps in the transcript once the run completes. A failed run
//! leaves the user's message in place next to the error.

mod surface;

pub use surface::HtmlSurface;

use crate::config::UiConfig;

const STYLE: &str = r"
body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
#transcript .message { margin: 0.75rem 0; padding: 0.5rem 0.75rem; border-radius: 0.5rem; }
#transcript .message-user { background: #eef3fb; }
#transcript .message-assistant { background: #f6f6f6; }
#transcript .pending { opacity: 0.7; }
#transcript .message-role { font-size: 0.75rem; text-transform: uppercase; color: #666; }
#transcript img { max-width: 100%; height: auto; }
#status { min-height: 1.5rem; color: #666; font-style: italic; }
#status.error { color: #b00020; font-style: normal; }
form { display: flex; gap: 0.5rem; }
form input { flex: 1; padding: 0.5rem; }
";

const SCRIPT: &str = r#"
(() => {
  const form = document.getElementById("chat-form");
  const input = document.getElementById("chat-input");
  const transcript = document.getElementById("transcript");
  const status = document.getElementById("status");

  const setStatus = (text, isError) => {
    status.textContent = text || "";
    status.classList.toggle("error", !!isError);
  };

  // Shown right away; the next transcript replaces it with the thread's copy.
  const appendUserMessage = (text) => {
    const bubble = document.createElement("div");
    bubble.className = "message message-user pending";
    const role = document.createElement("div");
    role.className = "message-role";
    role.textContent = "user";
    const body = document.createElement("p");
    body.textContent = text;
    bubble.append(role, body);
    transcript.append(bubble);
  };

  form.addEventListener("submit", async (e) => {
    e.preventDefault();
    const message = input.value.trim();
    if (!message) return;
    appendUserMessage(message);

    const body = { message };
    const sessionId = sessionStorage.getItem("chat-session");
    if (sessionId) body.session_id = sessionId;

    const res = await fetch("/api/chat", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify(body),
    });
    if (!res.ok) {
      setStatus(await res.text(), true);
      return;
    }

    const turn = await res.json();
    sessionStorage.setItem("chat-session", turn.session_id);
    input.value = "";
    form.querySelector("button").disabled = true;

    const events = new EventSource(turn.stream_url);
    events.addEventListener("run.thinking", (ev) => {
      setStatus(JSON.parse(ev.data).data.label, false);
    });
    events.addEventListener("transcript", (ev) => {
      transcript.innerHTML = JSON.parse(ev.data).data.html;
      setStatus("", false);
    });
    events.addEventListener("error", (ev) => {
      if (ev.data) setStatus(JSON.parse(ev.data).data.message, true);
    });
    events.addEventListener("done", () => {
      events.close();
      form.querySelector("button").disabled = false;
    });
  });
})();
"#;

/// Wrap `content` in a complete HTML document.
#[must_use]
pub fn html_shell(title: &str, content: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
{content}
</body>
</html>
"#,
        title = escape_html(title),
    )
}

/// The chat page: title, divider, transcript and input.
#[must_use]
pub fn chat_page(ui: &UiConfig) -> String {
    let content = format!(
        r#"<h1>{title}</h1>
<hr>
<div id="transcript"></div>
<div id="status"></div>
<form id="chat-form">
<input id="chat-input" name="message" autocomplete="off" placeholder="Ask a question">
<button type="submit">Send</button>
</form>
<script>{SCRIPT}</script>"#,
        title = escape_html(&ui.title),
    );
    html_shell(&ui.title, &content)
}

/// Escape text for use in HTML content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
