//! Remote assistant service: data model and client contract.
//!
//! The hosted service exposes assistants, threads, messages, runs and files.
//! This module defines the subset of that contract the chat front-end relies
//! on, as plain serde types plus the [`AssistantApi`] trait.
//!
//! # Implementations
//!
//! - [`AssistantsClient`]: HTTP client for the OpenAI Assistants API (v2).
//!
//! Tests provide in-memory implementations of [`AssistantApi`].

pub mod client;

pub use client::AssistantsClient;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Assistant metadata resolved from the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantProfile {
    /// Remote assistant identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// System instructions.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Model identifier.
    #[serde(default)]
    pub model: String,
    /// Declared tools, kept as raw JSON so unknown tool types survive a resync.
    #[serde(default)]
    pub tools: Vec<Value>,
    /// Files attached to the assistant.
    #[serde(default)]
    pub file_ids: Vec<String>,
}

/// Wire shape of an assistant object.
#[derive(Debug, Deserialize)]
pub(crate) struct RemoteAssistant {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    tools: Vec<Value>,
    #[serde(default)]
    tool_resources: Option<Value>,
    /// v1 assistants carried file ids at the top level.
    #[serde(default)]
    file_ids: Vec<String>,
}

impl From<RemoteAssistant> for AssistantProfile {
    fn from(remote: RemoteAssistant) -> Self {
        let mut file_ids = remote
            .tool_resources
            .as_ref()
            .and_then(|r| r.pointer("/code_interpreter/file_ids"))
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if file_ids.is_empty() {
            file_ids = remote.file_ids;
        }

        Self {
            id: remote.id,
            name: remote.name,
            instructions: remote.instructions,
            model: remote.model,
            tools: remote.tools,
            file_ids,
        }
    }
}

/// Full configuration pushed back to the remote assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantUpdate {
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub model: String,
    pub tools: Vec<Value>,
    pub file_ids: Vec<String>,
}

impl AssistantUpdate {
    /// Build an update that re-applies every field of `profile`.
    #[must_use]
    pub fn from_profile(profile: &AssistantProfile) -> Self {
        Self {
            name: profile.name.clone(),
            instructions: profile.instructions.clone(),
            model: profile.model.clone(),
            tools: profile.tools.clone(),
            file_ids: profile.file_ids.clone(),
        }
    }

    /// Request body in the v2 wire format.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "tools": self.tools,
        });
        if let Some(name) = &self.name {
            body["name"] = Value::String(name.clone());
        }
        if let Some(instructions) = &self.instructions {
            body["instructions"] = Value::String(instructions.clone());
        }
        if !self.file_ids.is_empty() {
            body["tool_resources"] = serde_json::json!({
                "code_interpreter": { "file_ids": self.file_ids }
            });
        }
        body
    }
}

/// A remote conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// Author of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    /// Any role this client does not render.
    #[serde(other)]
    Other,
}

impl MessageRole {
    /// Whether messages with this role appear in the transcript.
    #[must_use]
    pub fn is_rendered(self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Other => "other",
        }
    }
}

/// One typed fragment of a message body.
///
/// Parsing never fails: a part whose `type` is not recognised, or whose
/// payload is missing the expected field, is kept verbatim as [`ContentPart::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ContentPart {
    /// Text content.
    Text { value: String },
    /// Reference to an image stored on the remote service.
    ImageFile { file_id: String },
    /// Anything else, kept as received.
    Other { raw: Value },
}

impl From<Value> for ContentPart {
    fn from(raw: Value) -> Self {
        match raw.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(value) = raw.pointer("/text/value").and_then(Value::as_str) {
                    return Self::Text {
                        value: value.to_string(),
                    };
                }
            }
            Some("image_file") => {
                if let Some(file_id) = raw.pointer("/image_file/file_id").and_then(Value::as_str) {
                    return Self::ImageFile {
                        file_id: file_id.to_string(),
                    };
                }
            }
            _ => {}
        }
        Self::Other { raw }
    }
}

impl From<ContentPart> for Value {
    fn from(part: ContentPart) -> Self {
        match part {
            ContentPart::Text { value } => serde_json::json!({
                "type": "text",
                "text": { "value": value, "annotations": [] }
            }),
            ContentPart::ImageFile { file_id } => serde_json::json!({
                "type": "image_file",
                "image_file": { "file_id": file_id }
            }),
            ContentPart::Other { raw } => raw,
        }
    }
}

/// A message stored on a remote thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub created_at: i64,
}

/// One page of a thread's message listing (newest first).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePage {
    pub data: Vec<ThreadMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

/// Lifecycle status of a remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status string this client does not know.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }

    /// Terminal statuses that are not `completed`.
    ///
    /// `requires_action` is included: this client never submits tool outputs,
    /// so such a run can only sit there until it expires.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Failed | Self::Incomplete | Self::Expired | Self::RequiresAction
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// A remote processing job bound to a thread and an assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    /// Human-readable failure reason.
    #[must_use]
    pub fn failure_reason(&self) -> String {
        match &self.last_error {
            Some(RunError {
                code: Some(code),
                message,
            }) => format!("{code}: {message}"),
            Some(RunError { code: None, message }) => message.clone(),
            None => "no error detail reported".to_string(),
        }
    }
}

/// Parameters for starting a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRun {
    pub assistant_id: String,
    /// Tools requested for this run; omitted to use the assistant's defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

impl CreateRun {
    /// Request the tools the assistant declares.
    #[must_use]
    pub fn for_profile(profile: &AssistantProfile) -> Self {
        Self {
            assistant_id: profile.id.clone(),
            tools: (!profile.tools.is_empty()).then(|| profile.tools.clone()),
        }
    }
}

/// Contract of the remote assistant service.
///
/// Every method is a single remote call; none of them retry.
#[async_trait::async_trait]
pub trait AssistantApi: Send + Sync {
    /// Fetch assistant metadata by identifier.
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantProfile>;

    /// Overwrite the remote assistant's configuration.
    async fn update_assistant(
        &self,
        assistant_id: &str,
        update: &AssistantUpdate,
    ) -> Result<AssistantProfile>;

    /// Create an empty conversation thread.
    async fn create_thread(&self) -> Result<Thread>;

    /// Append a user message to a thread.
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage>;

    /// Start a run on a thread.
    async fn create_run(&self, thread_id: &str, request: &CreateRun) -> Result<Run>;

    /// Fetch the current state of a run.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Fetch one page of messages, newest first, starting after `after`.
    async fn list_messages(&self, thread_id: &str, after: Option<&str>) -> Result<MessagePage>;

    /// Download the raw bytes of a stored file.
    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Fetch every message on a thread, newest first, following pagination.
    async fn list_all_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let mut messages = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self.list_messages(thread_id, after.as_deref()).await?;
            let cursor = page.last_id.or_else(|| page.data.last().map(|m| m.id.clone()));
            let has_more = page.has_more;
            messages.extend(page.data);
            match cursor {
                Some(next) if has_more => after = Some(next),
                _ => break,
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_part_text() {
        let part: ContentPart = serde_json::from_value(serde_json::json!({
            "type": "text",
            "text": { "value": "Hello", "annotations": [] }
        }))
        .unwrap();
        assert_eq!(
            part,
            ContentPart::Text {
                value: "Hello".to_string()
            }
        );
    }

    #[test]
    fn test_content_part_image_file() {
        let part: ContentPart = serde_json::from_value(serde_json::json!({
            "type": "image_file",
            "image_file": { "file_id": "file-abc" }
        }))
        .unwrap();
        assert_eq!(
            part,
            ContentPart::ImageFile {
                file_id: "file-abc".to_string()
            }
        );
    }

    #[test]
    fn test_content_part_unknown_kept_raw() {
        let raw = serde_json::json!({ "type": "refusal", "refusal": "no" });
        let part: ContentPart = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(part, ContentPart::Other { raw });
    }

    #[test]
    fn test_content_part_malformed_text_is_other() {
        let raw = serde_json::json!({ "type": "text", "text": "flat" });
        let part: ContentPart = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(part, ContentPart::Other { raw });
    }

    #[test]
    fn test_unknown_role_and_status() {
        let msg: ThreadMessage = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "role": "system",
            "content": []
        }))
        .unwrap();
        assert_eq!(msg.role, MessageRole::Other);
        assert!(!msg.role.is_rendered());

        let run: Run = serde_json::from_value(serde_json::json!({
            "id": "run_1",
            "status": "paused_forever"
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_failure());
    }

    #[test]
    fn test_profile_reads_v2_tool_resources() {
        let remote: RemoteAssistant = serde_json::from_value(serde_json::json!({
            "id": "asst_1",
            "name": "Counsel",
            "instructions": "Answer legal questions.",
            "model": "gpt-4o",
            "tools": [{ "type": "code_interpreter" }],
            "tool_resources": { "code_interpreter": { "file_ids": ["file-1", "file-2"] } }
        }))
        .unwrap();
        let profile = AssistantProfile::from(remote);
        assert_eq!(profile.file_ids, vec!["file-1", "file-2"]);
        assert_eq!(profile.tools.len(), 1);
    }

    #[test]
    fn test_profile_falls_back_to_v1_file_ids() {
        let remote: RemoteAssistant = serde_json::from_value(serde_json::json!({
            "id": "asst_1",
            "model": "gpt-4",
            "file_ids": ["file-legacy"]
        }))
        .unwrap();
        assert_eq!(AssistantProfile::from(remote).file_ids, vec!["file-legacy"]);
    }

    #[test]
    fn test_update_body() {
        let update = AssistantUpdate {
            name: Some("Counsel".to_string()),
            instructions: None,
            model: "gpt-4o".to_string(),
            tools: vec![serde_json::json!({ "type": "code_interpreter" })],
            file_ids: vec!["file-1".to_string()],
        };
        let body = update.to_body();
        assert_eq!(body["name"], "Counsel");
        assert!(body.get("instructions").is_none());
        assert_eq!(body["tool_resources"]["code_interpreter"]["file_ids"][0], "file-1");
    }

    #[test]
    fn test_create_run_omits_empty_tools() {
        let profile = AssistantProfile {
            id: "asst_1".to_string(),
            ..AssistantProfile::default()
        };
        let body = serde_json::to_value(CreateRun::for_profile(&profile)).unwrap();
        assert_eq!(body, serde_json::json!({ "assistant_id": "asst_1" }));
    }

    #[test]
    fn test_failure_reason() {
        let run = Run {
            id: "run_1".to_string(),
            thread_id: "thread_1".to_string(),
            status: RunStatus::Failed,
            last_error: Some(RunError {
                code: Some("rate_limit_exceeded".to_string()),
                message: "slow down".to_string(),
            }),
        };
        assert_eq!(run.failure_reason(), "rate_limit_exceeded: slow down");
    }
}
