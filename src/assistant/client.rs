//! HTTP client for the OpenAI Assistants API.
//!
//! Implements [`AssistantApi`] over `reqwest`. Every request carries the
//! bearer credential and the `OpenAI-Beta` header selecting the assistants
//! API version.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    AssistantApi, AssistantProfile, AssistantUpdate, CreateRun, MessagePage, RemoteAssistant,
    Run, Thread, ThreadMessage,
};
use crate::config::{AssistantSettings, RemoteConfig};
use crate::error::{ChatError, Result};

/// Page size requested when listing thread messages (the API maximum).
const MESSAGE_PAGE_LIMIT: u32 = 100;

/// Error envelope returned by the remote service.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorFields>,
}

#[derive(Debug, Deserialize)]
struct ErrorFields {
    message: Option<String>,
}

/// Client for the hosted assistants API.
#[derive(Clone)]
pub struct AssistantsClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: std::sync::Arc<SecretString>,
    beta_header: String,
}

impl std::fmt::Debug for AssistantsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantsClient")
            .field("base_url", &self.base_url.as_str())
            .field("beta_header", &self.beta_header)
            .finish()
    }
}

impl AssistantsClient {
    /// Create a client from the secrets and the remote section of the config.
    pub fn new(settings: &AssistantSettings, remote: &RemoteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(remote.timeout_secs))
            .build()?;
        Self::with_client(settings, remote, http)
    }

    /// Create a client around an existing `reqwest` client.
    pub fn with_client(
        settings: &AssistantSettings,
        remote: &RemoteConfig,
        http: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            http,
            base_url: normalize_base_url(&remote.base_url)?,
            api_key: std::sync::Arc::new(SecretString::from(
                settings.api_key.expose_secret().to_owned(),
            )),
            beta_header: remote.beta_header.clone(),
        })
    }

    /// Base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ChatError::Configuration(format!("Invalid endpoint path '{path}': {e}")))
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        let rb = rb.bearer_auth(self.api_key.expose_secret());
        if self.beta_header.is_empty() {
            rb
        } else {
            rb.header("OpenAI-Beta", &self.beta_header)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &'static str, url: Url) -> Result<T> {
        tracing::debug!(operation, url = %url, "Remote GET");
        let response = self.authorize(self.http.get(url)).send().await?;
        Self::handle_response(operation, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
        body: &serde_json::Value,
    ) -> Result<T> {
        tracing::debug!(operation, url = %url, "Remote POST");
        let response = self.authorize(self.http.post(url)).json(body).send().await?;
        Self::handle_response(operation, response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T> {
        let response = Self::check_status(operation, response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn check_status(operation: &'static str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        tracing::warn!(operation, status = %status, error = %message, "Remote call rejected");
        Err(ChatError::RemoteCall {
            operation,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl AssistantApi for AssistantsClient {
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantProfile> {
        let url = self.url(&format!("assistants/{assistant_id}"))?;
        match self.get_json::<RemoteAssistant>("retrieve_assistant", url).await {
            Ok(remote) => Ok(remote.into()),
            Err(ChatError::RemoteCall {
                status, message, ..
            }) if status == StatusCode::NOT_FOUND.as_u16() => Err(ChatError::RemoteLookup {
                assistant_id: assistant_id.to_string(),
                message,
            }),
            Err(e) => Err(e),
        }
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        update: &AssistantUpdate,
    ) -> Result<AssistantProfile> {
        let url = self.url(&format!("assistants/{assistant_id}"))?;
        let remote: RemoteAssistant = self
            .post_json("update_assistant", url, &update.to_body())
            .await?;
        Ok(remote.into())
    }

    async fn create_thread(&self) -> Result<Thread> {
        let url = self.url("threads")?;
        self.post_json("create_thread", url, &serde_json::json!({}))
            .await
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        let url = self.url(&format!("threads/{thread_id}/messages"))?;
        let body = serde_json::json!({ "role": "user", "content": content });
        self.post_json("create_message", url, &body).await
    }

    async fn create_run(&self, thread_id: &str, request: &CreateRun) -> Result<Run> {
        let url = self.url(&format!("threads/{thread_id}/runs"))?;
        let body = serde_json::to_value(request)?;
        self.post_json("create_run", url, &body).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let url = self.url(&format!("threads/{thread_id}/runs/{run_id}"))?;
        self.get_json("retrieve_run", url).await
    }

    async fn list_messages(&self, thread_id: &str, after: Option<&str>) -> Result<MessagePage> {
        let mut url = self.url(&format!("threads/{thread_id}/messages"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("order", "desc");
            query.append_pair("limit", &MESSAGE_PAGE_LIMIT.to_string());
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }
        self.get_json("list_messages", url).await
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("files/{file_id}/content"))?;
        tracing::debug!(operation = "file_content", url = %url, "Remote GET");
        let response = self.authorize(self.http.get(url)).send().await?;
        let response = Self::check_status("file_content", response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Parse the base URL and make sure relative joins keep its path.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Configuration(
            "remote.base_url cannot be empty".to_string(),
        ));
    }
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| ChatError::Configuration(format!("Invalid remote.base_url '{raw}': {e}")))
}

/// Extract the service's error message from a response body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|p| p.error)
        .and_then(|e| e.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "no response body".to_string()
            } else {
                body.to_string()
            }
        })
}
