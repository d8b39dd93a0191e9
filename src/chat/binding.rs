//! Assistant binding: resolve the remote assistant and keep it in sync.

use crate::assistant::{AssistantApi, AssistantProfile, AssistantUpdate};
use crate::error::Result;
use crate::session::Session;

/// When the driver pushes the session's assistant settings back to the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResyncPolicy {
    /// Re-apply name, instructions, tools, model and files before every run.
    #[default]
    BeforeEveryRun,
    /// Trust the remote assistant as it is.
    Never,
}

impl ResyncPolicy {
    #[must_use]
    pub fn from_flag(resync_before_run: bool) -> Self {
        if resync_before_run {
            Self::BeforeEveryRun
        } else {
            Self::Never
        }
    }
}

/// Fetch the assistant's current metadata.
///
/// `model_override`, when set, replaces the model the assistant reports; the
/// override reaches the service on the next resync.
#[tracing::instrument(skip(api))]
pub async fn bind_assistant(
    api: &dyn AssistantApi,
    assistant_id: &str,
    model_override: Option<&str>,
) -> Result<AssistantProfile> {
    let mut profile = api.retrieve_assistant(assistant_id).await?;
    if let Some(model) = model_override.filter(|m| !m.trim().is_empty()) {
        tracing::info!(from = %profile.model, to = %model, "Overriding assistant model");
        profile.model = model.to_string();
    }

    tracing::info!(
        name: "assistant.bound",
        assistant_id = %profile.id,
        assistant_name = ?profile.name,
        model = %profile.model,
        tools = profile.tools.len(),
        files = profile.file_ids.len(),
        "Assistant bound"
    );
    Ok(profile)
}

/// Push the session's cached assistant settings to the remote assistant.
pub async fn resync_assistant(api: &dyn AssistantApi, session: &Session) -> Result<AssistantProfile> {
    let profile = session.profile();
    let update = AssistantUpdate::from_profile(&profile);
    let remote = api.update_assistant(&profile.id, &update).await?;
    tracing::debug!(
        session_id = %session.id(),
        assistant_id = %profile.id,
        model = %remote.model,
        "Assistant configuration re-applied"
    );
    Ok(remote)
}
